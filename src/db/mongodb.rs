//! # Capa de datos MongoDB
//!
//! Modelos persistidos y el repositorio [`MongoRepo`] con los accesos a las
//! colecciones. Las fechas se guardan como unix segundos (`i64`).
//!
//! Aquí vive también la frontera de coerción de promociones: el campo
//! `min_rental_hours` llega "suelto" de la base (número, string numérico,
//! string vacío o null) y se convierte una sola vez a un valor tipado antes
//! de entrar a la lógica de precios.

use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};
use std::env;

use crate::api::AppError;
use crate::pricing::{self, DiscountType, RateCard, RentalType, VehicleTerms};

pub type Result<T> = std::result::Result<T, AppError>;

/// Vehículo publicado en el marketplace
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Vehicle {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<mongodb::bson::oid::ObjectId>,
    pub brand: String,
    pub model: String,
    pub year: i32,
    /// Categoría libre: "4x4", "Sedán", "Deportivo", "SUV", "Familiar", "Moto", "Compacto"
    pub category: String,
    pub price_per_day: f64,
    /// Si falta o es 0, la tarifa horaria se deriva como `price_per_day / 8`
    pub price_per_hour: Option<f64>,
    /// Ciudad donde se entrega el vehículo
    pub location: String,
    pub rating: f64,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Marca del último intento de reserva; la transacción de creación la
    /// escribe para forzar conflicto entre intentos concurrentes sobre el
    /// mismo vehículo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_booking_at: Option<i64>,
    pub created_at: i64, // timestamp unix
}

impl Vehicle {
    /// Proyección del vehículo que consume el cálculo de precios
    pub fn terms(&self) -> VehicleTerms {
        VehicleTerms {
            category: self.category.clone(),
            location: self.location.clone(),
            rates: RateCard {
                price_per_day: self.price_per_day,
                price_per_hour: self.price_per_hour,
            },
        }
    }
}

/// Estado de una reserva
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    AwaitingConfirmation,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Parsea el valor persistido; `None` si no es un estado conocido
    pub fn parse(value: &str) -> Option<BookingStatus> {
        match value {
            "pending" => Some(BookingStatus::Pending),
            "awaiting_confirmation" => Some(BookingStatus::AwaitingConfirmation),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    /// Valor tal como se guarda en la colección
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::AwaitingConfirmation => "awaiting_confirmation",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }
}

/// Reserva de un vehículo
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Booking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<mongodb::bson::oid::ObjectId>,
    pub vehicle_id: mongodb::bson::oid::ObjectId,
    pub user_id: mongodb::bson::oid::ObjectId,
    pub start_date: i64, // timestamp unix
    pub end_date: i64,   // timestamp unix
    pub rental_type: RentalType,
    pub total_price: f64,
    pub promo_code: Option<String>,
    pub status: BookingStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Booking {
    /// Indica si esta reserva se cruza con el rango candidato
    ///
    /// El cruce es inclusivo en ambos bordes: una reserva que termina justo
    /// cuando empieza la otra cuenta como conflicto. Así se comportaba la
    /// consulta de la aplicación original; se conserva, aunque es
    /// discutiblemente más restrictivo de lo necesario.
    pub fn conflicts_with(&self, start: i64, end: i64) -> bool {
        self.start_date <= end && self.end_date >= start
    }
}

/// Valor crudo de `min_rental_hours` tal como puede venir de la base
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum LooseHours {
    Number(f64),
    Text(String),
}

/// Documento de promoción tal como se persiste
///
/// Se convierte a [`pricing::Promotion`] con [`PromotionDoc::terms`] apenas
/// se lee; nada aguas abajo trabaja con los campos crudos.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PromotionDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<mongodb::bson::oid::ObjectId>,
    /// Código único, siempre en mayúsculas
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub vehicle_type_condition: Option<String>,
    pub location_condition: Option<String>,
    /// Puede venir como número, string numérico, string vacío o null
    #[serde(default)]
    pub min_rental_hours: Option<LooseHours>,
    pub start_date: i64, // timestamp unix
    pub end_date: Option<i64>,
    pub is_active: bool,
    pub created_at: i64,
}

impl PromotionDoc {
    /// Mínimo de horas ya coercionado
    ///
    /// Cualquier valor ausente, vacío o no numérico equivale a 0 (sin
    /// mínimo). Esto reproduce el arreglo `toNumber(raw) || 0` que la
    /// aplicación original necesitó cuando la base empezó a devolver
    /// strings.
    pub fn min_hours(&self) -> f64 {
        let raw = match &self.min_rental_hours {
            Some(LooseHours::Number(n)) => *n,
            Some(LooseHours::Text(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
            None => 0.0,
        };
        if raw.is_finite() && raw > 0.0 {
            raw
        } else {
            0.0
        }
    }

    /// Promoción tipada para la lógica de precios
    pub fn terms(&self) -> pricing::Promotion {
        pricing::Promotion {
            code: self.code.clone(),
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            vehicle_type_condition: self.vehicle_type_condition.clone(),
            location_condition: self.location_condition.clone(),
            min_rental_hours: self.min_hours(),
            start_date: self.start_date,
            end_date: self.end_date,
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MongoRepo {
    pub client: Client,
    pub database: Database,
}

impl MongoRepo {
    pub async fn init() -> Result<MongoRepo> {
        let mongo_uri = env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let client = Client::with_uri_str(&mongo_uri)
            .await
            .map_err(|e| AppError::Internal(format!("Error conectando a MongoDB: {}", e)))?;

        let database_name = env::var("MONGODB_DATABASE")
            .unwrap_or_else(|_| "autorenta_reservation".to_string());

        let database = client.database(&database_name);

        // Test connection
        database
            .run_command(mongodb::bson::doc! {"ping": 1})
            .await
            .map_err(|e| AppError::Internal(format!("Error validando conexión MongoDB: {}", e)))?;

        tracing::info!("Conexión a MongoDB establecida exitosamente");

        Ok(MongoRepo { client, database })
    }

    pub fn vehicles(&self) -> Collection<Vehicle> {
        self.database.collection("vehicles")
    }

    pub fn bookings(&self) -> Collection<Booking> {
        self.database.collection("bookings")
    }

    pub fn promotions(&self) -> Collection<PromotionDoc> {
        self.database.collection("promotions")
    }

    // Método para crear índices si es necesario
    pub async fn create_indexes(&self) -> Result<()> {
        use mongodb::bson::doc;
        use mongodb::{options::IndexOptions, IndexModel};

        // Índices para vehicles
        let vehicles = self.vehicles();
        let vehicle_indexes = vec![
            IndexModel::builder().keys(doc! { "category": 1 }).build(),
            IndexModel::builder().keys(doc! { "location": 1 }).build(),
        ];

        vehicles
            .create_indexes(vehicle_indexes)
            .await
            .map_err(|e| AppError::Internal(format!("Error creando índices vehicles: {}", e)))?;

        // Índices para bookings
        let bookings = self.bookings();
        let booking_indexes = vec![
            IndexModel::builder()
                .keys(doc! { "vehicle_id": 1, "start_date": 1 })
                .build(),
            IndexModel::builder().keys(doc! { "user_id": 1 }).build(),
            IndexModel::builder().keys(doc! { "status": 1 }).build(),
        ];

        bookings
            .create_indexes(booking_indexes)
            .await
            .map_err(|e| AppError::Internal(format!("Error creando índices bookings: {}", e)))?;

        // Índices para promotions: el código es único
        let promotions = self.promotions();
        let promotion_indexes = vec![IndexModel::builder()
            .keys(doc! { "code": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build()];

        promotions
            .create_indexes(promotion_indexes)
            .await
            .map_err(|e| AppError::Internal(format!("Error creando índices promotions: {}", e)))?;

        tracing::info!("Índices MongoDB creados exitosamente");
        Ok(())
    }

    // Función auxiliar para obtener timestamp actual
    pub fn current_timestamp() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    const DAY: i64 = 86_400;

    fn booking(start: i64, end: i64) -> Booking {
        Booking {
            id: None,
            vehicle_id: ObjectId::new(),
            user_id: ObjectId::new(),
            start_date: start,
            end_date: end,
            rental_type: RentalType::Days,
            total_price: 100.0,
            promo_code: None,
            status: BookingStatus::Pending,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn promo_doc(min_rental_hours: Option<LooseHours>) -> PromotionDoc {
        PromotionDoc {
            id: None,
            code: "VERANO20".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: 20.0,
            vehicle_type_condition: None,
            location_condition: None,
            min_rental_hours,
            start_date: 0,
            end_date: None,
            is_active: true,
            created_at: 0,
        }
    }

    #[test]
    fn rangos_que_se_cruzan_entran_en_conflicto() {
        let existente = booking(2 * DAY, 5 * DAY);
        assert!(existente.conflicts_with(4 * DAY, 7 * DAY));
        assert!(existente.conflicts_with(0, 3 * DAY));
        assert!(existente.conflicts_with(3 * DAY, 4 * DAY));
    }

    #[test]
    fn rangos_que_apenas_se_tocan_tambien_cuentan_como_conflicto() {
        // la reserva existente termina exactamente cuando empieza la nueva
        let existente = booking(DAY, 2 * DAY);
        assert!(existente.conflicts_with(2 * DAY, 3 * DAY));
        assert!(existente.conflicts_with(0, DAY));
    }

    #[test]
    fn rangos_separados_no_entran_en_conflicto() {
        let existente = booking(DAY, 2 * DAY);
        assert!(!existente.conflicts_with(3 * DAY, 4 * DAY));
        assert!(!existente.conflicts_with(0, DAY - 1));
    }

    #[test]
    fn min_rental_hours_suelto_se_coerciona_a_cero() {
        // null, string vacío, "0" y 0 significan lo mismo: sin mínimo
        assert_eq!(promo_doc(None).min_hours(), 0.0);
        assert_eq!(
            promo_doc(Some(LooseHours::Text("".to_string()))).min_hours(),
            0.0
        );
        assert_eq!(
            promo_doc(Some(LooseHours::Text("0".to_string()))).min_hours(),
            0.0
        );
        assert_eq!(promo_doc(Some(LooseHours::Number(0.0))).min_hours(), 0.0);
        // basura no numérica también
        assert_eq!(
            promo_doc(Some(LooseHours::Text("sin minimo".to_string()))).min_hours(),
            0.0
        );
    }

    #[test]
    fn min_rental_hours_numerico_se_respeta() {
        assert_eq!(promo_doc(Some(LooseHours::Number(48.0))).min_hours(), 48.0);
        assert_eq!(
            promo_doc(Some(LooseHours::Text("72".to_string()))).min_hours(),
            72.0
        );
        assert_eq!(
            promo_doc(Some(LooseHours::Text(" 24 ".to_string()))).min_hours(),
            24.0
        );
    }

    #[test]
    fn los_estados_conocidos_se_parsean_y_el_resto_no() {
        assert_eq!(BookingStatus::parse("pending"), Some(BookingStatus::Pending));
        assert_eq!(
            BookingStatus::parse("awaiting_confirmation"),
            Some(BookingStatus::AwaitingConfirmation)
        );
        assert_eq!(
            BookingStatus::parse("cancelled"),
            Some(BookingStatus::Cancelled)
        );
        assert_eq!(BookingStatus::parse("cancelado"), None);
        assert_eq!(BookingStatus::parse(""), None);
    }

    #[test]
    fn parse_y_as_str_son_inversos() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::AwaitingConfirmation,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn el_documento_crudo_se_convierte_en_promocion_tipada() {
        let doc = promo_doc(Some(LooseHours::Text("48".to_string())));
        let promo = doc.terms();
        assert_eq!(promo.code, "VERANO20");
        assert_eq!(promo.min_rental_hours, 48.0);
        assert_eq!(promo.discount_type, DiscountType::Percentage);
    }
}
