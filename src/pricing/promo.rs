//! # Promociones
//!
//! Tipado fuerte y reglas de elegibilidad de los códigos promocionales.
//!
//! El documento que llega de la base de datos trae campos "sueltos" (por
//! ejemplo `min_rental_hours` puede venir como número, string numérico,
//! string vacío o null); la capa de datos lo convierte una sola vez a este
//! [`Promotion`] tipado y el resto del código no vuelve a tocar valores
//! crudos.

use serde::{Deserialize, Serialize};

use super::BookingError;

/// Tipo de descuento de una promoción
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// Porcentaje sobre el precio antes del descuento
    Percentage,
    /// Monto fijo en la misma moneda que el precio
    Fixed,
}

/// Valor sentinela en las condiciones que equivale a "sin restricción"
const CONDITION_ALL: &str = "all";

/// Promoción ya tipada, lista para validar
#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
    /// Código normalizado en mayúsculas
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    /// Restricción por categoría de vehículo ("all" o ausente = sin restricción)
    pub vehicle_type_condition: Option<String>,
    /// Restricción por ciudad ("all" o ausente = sin restricción)
    pub location_condition: Option<String>,
    /// Duración mínima del alquiler en horas; 0 = sin mínimo
    pub min_rental_hours: f64,
    /// Inicio de vigencia (unix segundos)
    pub start_date: i64,
    /// Fin de vigencia; sin fin si es `None`
    pub end_date: Option<i64>,
    pub is_active: bool,
}

impl Promotion {
    /// Valida la elegibilidad de la promoción para un alquiler concreto
    ///
    /// Las reglas se evalúan en orden fijo y se corta en la primera que
    /// falla, cada una con su propio error:
    ///
    /// 1. la promoción debe estar activa
    /// 2. ya debe haber comenzado su vigencia
    /// 3. no debe haber vencido (si tiene fecha de fin)
    /// 4. la categoría del vehículo debe cumplir la condición
    /// 5. la ciudad del vehículo debe cumplir la condición
    /// 6. la duración debe alcanzar el mínimo de horas (límite inclusivo:
    ///    exactamente el mínimo es válido)
    ///
    /// La búsqueda del código (`PromoNotFound`) ocurre antes, en la capa que
    /// consulta la base de datos.
    pub fn validate(
        &self,
        now: i64,
        vehicle_category: &str,
        vehicle_location: &str,
        rental_hours: f64,
    ) -> Result<(), BookingError> {
        if !self.is_active {
            return Err(BookingError::PromoInactive);
        }

        if now < self.start_date {
            return Err(BookingError::PromoNotStarted);
        }

        if let Some(end) = self.end_date {
            if now > end {
                return Err(BookingError::PromoExpired);
            }
        }

        if let Some(condition) = &self.vehicle_type_condition {
            if !condition_matches(condition, vehicle_category) {
                return Err(BookingError::VehicleTypeMismatch);
            }
        }

        if let Some(condition) = &self.location_condition {
            if !condition_matches(condition, vehicle_location) {
                return Err(BookingError::LocationMismatch);
            }
        }

        if self.min_rental_hours > 0.0 && rental_hours < self.min_rental_hours {
            return Err(BookingError::MinDurationNotMet {
                min_hours: self.min_rental_hours,
            });
        }

        Ok(())
    }

    /// Monto del descuento sobre `price_before_discount`
    ///
    /// Porcentual: `precio * valor / 100`. Fijo: el valor tal cual. En ambos
    /// casos el descuento se recorta al precio para que el total nunca quede
    /// negativo.
    pub fn discount_amount(&self, price_before_discount: f64) -> f64 {
        let raw = match self.discount_type {
            DiscountType::Percentage => price_before_discount * self.discount_value / 100.0,
            DiscountType::Fixed => self.discount_value,
        };
        raw.min(price_before_discount)
    }
}

/// Evalúa una condición de categoría o ubicación
///
/// El sentinela "all" (en cualquier capitalización) y la condición vacía no
/// restringen nada. El resto se compara como substring sin distinguir
/// mayúsculas, igual que lo hacía la aplicación original ("4x4" acepta
/// "Camioneta 4x4").
fn condition_matches(condition: &str, value: &str) -> bool {
    let condition = condition.trim();
    if condition.is_empty() || condition.eq_ignore_ascii_case(CONDITION_ALL) {
        return true;
    }
    value.to_lowercase().contains(&condition.to_lowercase())
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Promoción sin restricciones, vigente desde el instante 0
    pub fn promo_base() -> Promotion {
        Promotion {
            code: "PROMO".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: 10.0,
            vehicle_type_condition: None,
            location_condition: None,
            min_rental_hours: 0.0,
            start_date: 0,
            end_date: None,
            is_active: true,
        }
    }

    fn validar(promo: &Promotion, now: i64) -> Result<(), BookingError> {
        promo.validate(now, "Sedán", "Lima", 72.0)
    }

    #[test]
    fn promocion_inactiva() {
        let promo = Promotion {
            is_active: false,
            ..promo_base()
        };
        assert_eq!(validar(&promo, 100).unwrap_err(), BookingError::PromoInactive);
    }

    #[test]
    fn promocion_que_no_comenzo() {
        let promo = Promotion {
            start_date: 1_000,
            ..promo_base()
        };
        assert_eq!(
            validar(&promo, 999).unwrap_err(),
            BookingError::PromoNotStarted
        );
        // el inicio exacto ya es válido
        assert!(validar(&promo, 1_000).is_ok());
    }

    #[test]
    fn promocion_expirada() {
        let promo = Promotion {
            end_date: Some(2_000),
            ..promo_base()
        };
        assert_eq!(validar(&promo, 2_001).unwrap_err(), BookingError::PromoExpired);
        // el fin exacto todavía es válido
        assert!(validar(&promo, 2_000).is_ok());
    }

    #[test]
    fn condicion_de_categoria_acepta_substring_sin_mayusculas() {
        let promo = Promotion {
            vehicle_type_condition: Some("4x4".to_string()),
            ..promo_base()
        };

        assert!(promo.validate(0, "Camioneta 4x4", "Lima", 24.0).is_ok());
        assert!(promo.validate(0, "4X4", "Lima", 24.0).is_ok());
        assert_eq!(
            promo.validate(0, "Sedán", "Lima", 24.0).unwrap_err(),
            BookingError::VehicleTypeMismatch
        );
    }

    #[test]
    fn condicion_all_no_restringe() {
        let promo = Promotion {
            vehicle_type_condition: Some("all".to_string()),
            location_condition: Some("ALL".to_string()),
            ..promo_base()
        };
        assert!(promo.validate(0, "Moto", "Cusco", 1.0).is_ok());
    }

    #[test]
    fn condicion_de_ubicacion() {
        let promo = Promotion {
            location_condition: Some("lima".to_string()),
            ..promo_base()
        };
        assert!(promo.validate(0, "Sedán", "Lima", 24.0).is_ok());
        assert_eq!(
            promo.validate(0, "Sedán", "Arequipa", 24.0).unwrap_err(),
            BookingError::LocationMismatch
        );
    }

    #[test]
    fn minimo_de_horas_es_inclusivo() {
        let promo = Promotion {
            min_rental_hours: 72.0,
            ..promo_base()
        };
        assert!(promo.validate(0, "Sedán", "Lima", 72.0).is_ok());
        assert_eq!(
            promo.validate(0, "Sedán", "Lima", 71.0).unwrap_err(),
            BookingError::MinDurationNotMet { min_hours: 72.0 }
        );
    }

    #[test]
    fn sin_minimo_de_horas_siempre_pasa() {
        let promo = promo_base();
        assert!(promo.validate(0, "Sedán", "Lima", 0.5).is_ok());
    }

    #[test]
    fn las_reglas_se_evaluan_en_orden() {
        // inactiva y además vencida: gana el error de inactividad
        let promo = Promotion {
            is_active: false,
            end_date: Some(0),
            ..promo_base()
        };
        assert_eq!(validar(&promo, 100).unwrap_err(), BookingError::PromoInactive);
    }

    #[test]
    fn descuento_porcentual_y_fijo() {
        let porcentual = Promotion {
            discount_type: DiscountType::Percentage,
            discount_value: 20.0,
            ..promo_base()
        };
        assert_eq!(porcentual.discount_amount(300.0), 60.0);

        let fijo = Promotion {
            discount_type: DiscountType::Fixed,
            discount_value: 50.0,
            ..promo_base()
        };
        assert_eq!(fijo.discount_amount(300.0), 50.0);
    }

    #[test]
    fn el_descuento_nunca_supera_el_precio() {
        let fijo = Promotion {
            discount_type: DiscountType::Fixed,
            discount_value: 500.0,
            ..promo_base()
        };
        assert_eq!(fijo.discount_amount(240.0), 240.0);

        let porcentual = Promotion {
            discount_type: DiscountType::Percentage,
            discount_value: 250.0,
            ..promo_base()
        };
        assert_eq!(porcentual.discount_amount(100.0), 100.0);
    }
}
