//! # Cálculo de precios de alquiler
//!
//! Módulo puro (sin dependencias de actix ni de MongoDB) que concentra toda la
//! lógica de negocio de una cotización de alquiler:
//!
//! - Duración y precio base según modalidad (por días o por horas)
//! - Validación de promociones y cálculo del descuento
//! - Precio final con el descuento aplicado
//!
//! Antes esta lógica vivía repetida en varias pantallas del frontend, con
//! pequeñas diferencias entre copias. Aquí hay una sola implementación que
//! recibe valores explícitos y devuelve `Result`, de modo que cualquier capa
//! (API REST, tests, scripts) puede usarla sin arrastrar el framework.

pub mod promo;

pub use promo::{DiscountType, Promotion};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errores de negocio de una cotización de alquiler
///
/// Todos son recuperables: el cliente puede corregir las fechas o quitar el
/// código de promoción y volver a intentar. Los mensajes se muestran tal cual
/// al usuario final.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookingError {
    /// La fecha de inicio no es estrictamente anterior a la de fin
    #[error("Rango de fechas inválido: la fecha de inicio debe ser anterior a la de fin")]
    InvalidRange,

    /// No existe una promoción con ese código
    #[error("El código de promoción no existe")]
    PromoNotFound,

    /// La promoción está desactivada
    #[error("La promoción no está activa")]
    PromoInactive,

    /// La promoción todavía no entra en vigencia
    #[error("La promoción aún no ha comenzado")]
    PromoNotStarted,

    /// La promoción ya venció
    #[error("La promoción ha expirado")]
    PromoExpired,

    /// La promoción está restringida a otra categoría de vehículo
    #[error("La promoción no aplica para esta categoría de vehículo")]
    VehicleTypeMismatch,

    /// La promoción está restringida a otra ciudad
    #[error("La promoción no aplica para esta ubicación")]
    LocationMismatch,

    /// El alquiler no llega a la duración mínima que exige la promoción
    #[error("La promoción requiere un alquiler mínimo de {min_hours} horas")]
    MinDurationNotMet { min_hours: f64 },

    /// Ya existe una reserva activa que se cruza con el rango pedido
    #[error("El vehículo no está disponible en las fechas seleccionadas")]
    RangeUnavailable,

    /// No se pudo consultar la base de datos; la reserva no continúa
    #[error("No se pudo verificar la disponibilidad, intenta nuevamente")]
    StoreUnavailable,
}

/// Modalidad de facturación del alquiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalType {
    /// Se cobra por día completo (unidad de 24 horas)
    Days,
    /// Se cobra por hora
    Hours,
}

impl RentalType {
    /// Segundos que dura una unidad de facturación
    pub fn unit_seconds(&self) -> i64 {
        match self {
            RentalType::Days => 86_400,
            RentalType::Hours => 3_600,
        }
    }

    /// Horas que dura una unidad de facturación
    pub fn unit_hours(&self) -> f64 {
        match self {
            RentalType::Days => 24.0,
            RentalType::Hours => 1.0,
        }
    }
}

/// Tarifario de un vehículo
#[derive(Debug, Clone, PartialEq)]
pub struct RateCard {
    /// Precio por día completo
    pub price_per_day: f64,
    /// Precio por hora; si falta o es 0 se deriva del precio diario
    pub price_per_hour: Option<f64>,
}

impl RateCard {
    /// Tarifa horaria efectiva
    ///
    /// Usa `price_per_hour` cuando existe y es distinto de cero; si no,
    /// deriva la tarifa como `price_per_day / 8` (jornada de 8 horas).
    pub fn effective_hourly_rate(&self) -> f64 {
        match self.price_per_hour {
            Some(rate) if rate != 0.0 => rate,
            _ => self.price_per_day / 8.0,
        }
    }
}

/// Datos de un vehículo que participan en la cotización
///
/// La categoría y la ciudad solo se usan para evaluar las condiciones de una
/// promoción; el tarifario determina el precio base.
#[derive(Debug, Clone)]
pub struct VehicleTerms {
    pub category: String,
    pub location: String,
    pub rates: RateCard,
}

/// Cotización de un alquiler
///
/// Se construye con [`Quote::new`] a partir del vehículo, la modalidad y el
/// rango pedido. La promoción se aplica después con
/// [`Quote::apply_promotion`]; cambiar el rango con [`Quote::set_range`]
/// descarta cualquier descuento ya aplicado, porque la elegibilidad depende
/// de la duración y debe revalidarse.
#[derive(Debug, Clone)]
pub struct Quote {
    vehicle: VehicleTerms,
    rental_type: RentalType,
    start: i64,
    end: i64,
    duration: i64,
    base_price: f64,
    applied_code: Option<String>,
    discount: f64,
}

impl Quote {
    /// Crea una cotización para el rango `[start, end]` (unix segundos)
    ///
    /// # Errores
    /// - `InvalidRange`: si `start` no es estrictamente anterior a `end`
    pub fn new(
        vehicle: VehicleTerms,
        rental_type: RentalType,
        start: i64,
        end: i64,
    ) -> Result<Quote, BookingError> {
        let duration = duration_units(start, end, rental_type.unit_seconds())?;
        let base_price = base_price(&vehicle.rates, rental_type, duration);

        Ok(Quote {
            vehicle,
            rental_type,
            start,
            end,
            duration,
            base_price,
            applied_code: None,
            discount: 0.0,
        })
    }

    /// Cambia el rango de fechas y recalcula duración y precio base
    ///
    /// Cualquier promoción aplicada se descarta: la elegibilidad (duración
    /// mínima, vigencia) debe validarse de nuevo contra el rango nuevo.
    pub fn set_range(&mut self, start: i64, end: i64) -> Result<(), BookingError> {
        let duration = duration_units(start, end, self.rental_type.unit_seconds())?;

        self.start = start;
        self.end = end;
        self.duration = duration;
        self.base_price = base_price(&self.vehicle.rates, self.rental_type, duration);
        self.clear_promotion();

        Ok(())
    }

    /// Valida la promoción contra esta cotización y aplica el descuento
    ///
    /// Devuelve el monto descontado. El descuento nunca supera el precio
    /// base; aplicar una promoción reemplaza a la anterior.
    ///
    /// # Errores
    /// Cualquiera de los errores de elegibilidad de [`Promotion::validate`].
    pub fn apply_promotion(
        &mut self,
        promotion: &Promotion,
        now: i64,
    ) -> Result<f64, BookingError> {
        promotion.validate(
            now,
            &self.vehicle.category,
            &self.vehicle.location,
            self.duration_hours(),
        )?;

        let discount = promotion.discount_amount(self.base_price);
        self.applied_code = Some(promotion.code.clone());
        self.discount = discount;

        Ok(discount)
    }

    /// Quita la promoción aplicada y vuelve el descuento a 0
    pub fn clear_promotion(&mut self) {
        self.applied_code = None;
        self.discount = 0.0;
    }

    /// Unidades facturadas (días u horas según la modalidad)
    pub fn duration(&self) -> i64 {
        self.duration
    }

    /// Duración del alquiler expresada en horas
    pub fn duration_hours(&self) -> f64 {
        self.duration as f64 * self.rental_type.unit_hours()
    }

    pub fn rental_type(&self) -> RentalType {
        self.rental_type
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    /// Precio antes de descuentos, sin redondear
    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    /// Descuento aplicado (0 si no hay promoción)
    pub fn discount(&self) -> f64 {
        self.discount
    }

    /// Código de la promoción aplicada, si hay una
    pub fn applied_code(&self) -> Option<&str> {
        self.applied_code.as_deref()
    }

    /// Precio final: `max(0, base - descuento)`
    pub fn total(&self) -> f64 {
        (self.base_price - self.discount).max(0.0)
    }
}

/// Valida que un rango de fechas sea utilizable
///
/// El inicio debe ser estrictamente anterior al fin. Toda entrada de rangos
/// (cotización, creación de reserva, consulta de disponibilidad) pasa por
/// aquí antes de cualquier otro cálculo o chequeo de cruces.
pub fn validate_range(start: i64, end: i64) -> Result<(), BookingError> {
    if end - start <= 0 {
        return Err(BookingError::InvalidRange);
    }
    Ok(())
}

/// Unidades completas que cubre el rango, redondeando hacia arriba
///
/// Una fracción de unidad cuenta como unidad entera (25 horas en modalidad
/// por días son 2 días).
fn duration_units(start: i64, end: i64, unit: i64) -> Result<i64, BookingError> {
    validate_range(start, end)?;
    Ok((end - start + unit - 1) / unit)
}

fn base_price(rates: &RateCard, rental_type: RentalType, duration: i64) -> f64 {
    let rate = match rental_type {
        RentalType::Days => rates.price_per_day,
        RentalType::Hours => rates.effective_hourly_rate(),
    };
    duration as f64 * rate
}

/// Redondea un monto a 2 decimales
///
/// Se aplica una sola vez, al armar la respuesta; los cálculos intermedios
/// trabajan con el valor completo.
pub fn round_to_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::promo::tests::promo_base;
    use super::*;

    const DAY: i64 = 86_400;
    const HOUR: i64 = 3_600;

    fn terms(price_per_day: f64, price_per_hour: Option<f64>) -> VehicleTerms {
        VehicleTerms {
            category: "Sedán".to_string(),
            location: "Lima".to_string(),
            rates: RateCard {
                price_per_day,
                price_per_hour,
            },
        }
    }

    #[test]
    fn duracion_en_dias_redondea_hacia_arriba() {
        let quote = Quote::new(terms(100.0, None), RentalType::Days, 0, 3 * DAY).unwrap();
        assert_eq!(quote.duration(), 3);

        // 3 días y una hora cuentan como 4 días
        let quote = Quote::new(terms(100.0, None), RentalType::Days, 0, 3 * DAY + HOUR).unwrap();
        assert_eq!(quote.duration(), 4);
    }

    #[test]
    fn duracion_en_horas_redondea_hacia_arriba() {
        let quote = Quote::new(terms(100.0, None), RentalType::Hours, 0, 5 * HOUR).unwrap();
        assert_eq!(quote.duration(), 5);

        let quote = Quote::new(terms(100.0, None), RentalType::Hours, 0, 5 * HOUR + 60).unwrap();
        assert_eq!(quote.duration(), 6);
    }

    #[test]
    fn rango_invertido_o_degenerado_es_rechazado() {
        let err = Quote::new(terms(100.0, None), RentalType::Days, 2 * DAY, DAY).unwrap_err();
        assert_eq!(err, BookingError::InvalidRange);

        let err = Quote::new(terms(100.0, None), RentalType::Days, DAY, DAY).unwrap_err();
        assert_eq!(err, BookingError::InvalidRange);
    }

    #[test]
    fn validate_range_rechaza_lo_mismo_que_la_cotizacion() {
        // un rango invertido que "envuelve" reservas existentes no debe
        // llegar nunca al chequeo de cruces: se corta aquí
        assert_eq!(
            validate_range(5 * DAY, 3 * DAY).unwrap_err(),
            BookingError::InvalidRange
        );
        assert_eq!(
            validate_range(DAY, DAY).unwrap_err(),
            BookingError::InvalidRange
        );
        assert!(validate_range(DAY, 2 * DAY).is_ok());
    }

    #[test]
    fn tarifa_horaria_usa_el_precio_por_hora_si_existe() {
        let rates = RateCard {
            price_per_day: 100.0,
            price_per_hour: Some(15.0),
        };
        assert_eq!(rates.effective_hourly_rate(), 15.0);
    }

    #[test]
    fn tarifa_horaria_se_deriva_del_precio_diario() {
        let rates = RateCard {
            price_per_day: 100.0,
            price_per_hour: None,
        };
        assert_eq!(rates.effective_hourly_rate(), 12.5);

        // un precio por hora en 0 también cae al derivado
        let rates = RateCard {
            price_per_day: 100.0,
            price_per_hour: Some(0.0),
        };
        assert_eq!(rates.effective_hourly_rate(), 12.5);
    }

    #[test]
    fn precio_base_por_dias_y_por_horas() {
        let quote = Quote::new(terms(100.0, None), RentalType::Days, 0, 3 * DAY).unwrap();
        assert_eq!(quote.base_price(), 300.0);

        let quote = Quote::new(terms(100.0, Some(15.0)), RentalType::Hours, 0, 4 * HOUR).unwrap();
        assert_eq!(quote.base_price(), 60.0);
    }

    #[test]
    fn escenario_verano20() {
        // S/100 por día, 3 días completos, 20% de descuento sin condiciones
        let mut quote = Quote::new(terms(100.0, None), RentalType::Days, 0, 3 * DAY).unwrap();
        assert_eq!(quote.base_price(), 300.0);

        let promo = Promotion {
            code: "VERANO20".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: 20.0,
            ..promo_base()
        };

        let discount = quote.apply_promotion(&promo, DAY).unwrap();
        assert_eq!(discount, 60.0);
        assert_eq!(quote.total(), 240.0);
        assert_eq!(quote.applied_code(), Some("VERANO20"));
    }

    #[test]
    fn descuento_fijo_se_recorta_al_precio() {
        // descuento fijo de S/500 sobre un alquiler de S/240
        let mut quote =
            Quote::new(terms(80.0, None), RentalType::Days, 0, 3 * DAY).unwrap();
        assert_eq!(quote.base_price(), 240.0);

        let promo = Promotion {
            code: "MEGA500".to_string(),
            discount_type: DiscountType::Fixed,
            discount_value: 500.0,
            ..promo_base()
        };

        let discount = quote.apply_promotion(&promo, DAY).unwrap();
        assert_eq!(discount, 240.0);
        assert_eq!(quote.total(), 0.0);
    }

    #[test]
    fn porcentaje_mayor_a_cien_no_deja_el_total_negativo() {
        let mut quote = Quote::new(terms(100.0, None), RentalType::Days, 0, DAY).unwrap();

        let promo = Promotion {
            code: "ABSURDO".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: 150.0,
            ..promo_base()
        };

        quote.apply_promotion(&promo, DAY).unwrap();
        assert_eq!(quote.discount(), 100.0);
        assert_eq!(quote.total(), 0.0);
    }

    #[test]
    fn minimo_de_72_horas_admite_exactamente_3_dias() {
        let mut quote = Quote::new(terms(100.0, None), RentalType::Days, 0, 3 * DAY).unwrap();

        let promo = Promotion {
            code: "LARGO".to_string(),
            min_rental_hours: 72.0,
            ..promo_base()
        };

        // 3 días = 72 horas: el mínimo es inclusivo
        assert!(quote.apply_promotion(&promo, DAY).is_ok());

        // 2 días = 48 horas: por debajo del mínimo
        quote.set_range(0, 2 * DAY).unwrap();
        assert_eq!(
            quote.apply_promotion(&promo, DAY).unwrap_err(),
            BookingError::MinDurationNotMet { min_hours: 72.0 }
        );
    }

    #[test]
    fn cambiar_el_rango_descarta_la_promocion_aplicada() {
        let mut quote = Quote::new(terms(100.0, None), RentalType::Days, 0, 3 * DAY).unwrap();

        let promo = Promotion {
            code: "VERANO20".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: 20.0,
            ..promo_base()
        };
        quote.apply_promotion(&promo, DAY).unwrap();
        assert_eq!(quote.discount(), 60.0);

        quote.set_range(0, 5 * DAY).unwrap();
        assert_eq!(quote.discount(), 0.0);
        assert_eq!(quote.applied_code(), None);
        assert_eq!(quote.total(), 500.0);
    }

    #[test]
    fn redondeo_a_centimos_solo_al_presentar() {
        assert_eq!(round_to_cents(33.333333), 33.33);
        assert_eq!(round_to_cents(33.335), 33.34);
        assert_eq!(round_to_cents(240.0), 240.0);
    }
}
