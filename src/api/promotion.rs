//! # API de Promociones
//!
//! Alta de códigos promocionales y validación de un código contra un
//! alquiler concreto. La validación reutiliza el mismo cálculo que la
//! cotización de reservas, así el descuento que ve el usuario al aplicar el
//! código es exactamente el que se cobrará.

use actix_web::{post, web, HttpResponse, Responder};
use mongodb::bson::{doc, oid::ObjectId};
use serde::Deserialize;
use serde_json::json;

use super::booking::{build_quote, fetch_vehicle, parse_datetime};
use super::middleware::ErrorLogExt;
use super::{AppError, AppResult};
use crate::db::{LooseHours, MongoRepo, PromotionDoc};
use crate::pricing::{round_to_cents, DiscountType, RentalType};

/// Datos para crear una promoción
#[derive(Deserialize)]
struct CreatePromotion {
    /// Código que escribe el cliente; se guarda en mayúsculas
    code: String,
    discount_type: DiscountType,
    discount_value: f64,
    /// Restricción por categoría de vehículo ("all" o ausente = sin restricción)
    vehicle_type_condition: Option<String>,
    /// Restricción por ciudad ("all" o ausente = sin restricción)
    location_condition: Option<String>,
    /// Mínimo de horas de alquiler; ausente o 0 = sin mínimo
    min_rental_hours: Option<f64>,
    /// Inicio de vigencia (RFC 3339)
    start_date: String,
    /// Fin de vigencia (RFC 3339); sin fin si se omite
    end_date: Option<String>,
    /// Activa por defecto
    is_active: Option<bool>,
}

/// Datos para validar un código contra un alquiler
#[derive(Deserialize)]
struct ValidatePromotion {
    code: String,
    vehicle_id: String,
    start_date: String,
    end_date: String,
    rental_type: RentalType,
}

/// Crea una promoción
///
/// El código se normaliza a mayúsculas y debe ser único; el índice de la
/// colección respalda la verificación previa.
///
/// # Respuesta
/// ```json
/// {
///   "message": "Promoción creada correctamente",
///   "code": "VERANO20",
///   "id": "507f1f77bcf86cd799439011"
/// }
/// ```
///
/// # Errores
/// - `400 Bad Request`: datos de validación incorrectos
/// - `409 Conflict`: ya existe una promoción con ese código
/// - `500 Internal Server Error`: error de base de datos
#[post("/promotions")]
async fn create_promotion(
    repo: web::Data<MongoRepo>,
    data: web::Json<CreatePromotion>,
) -> AppResult<impl Responder> {
    let code = data.code.trim().to_uppercase();

    // Validación básica
    if code.is_empty() {
        return Err(AppError::validation_field("code", "El código es requerido"));
    }

    if data.discount_value <= 0.0 {
        return Err(AppError::validation_field(
            "discount_value",
            "El valor del descuento debe ser mayor a 0",
        ));
    }

    let start_date = parse_datetime(&data.start_date)?;
    let end_date = match &data.end_date {
        Some(end) => {
            let end = parse_datetime(end)?;
            if end < start_date {
                return Err(AppError::validation_field(
                    "end_date",
                    "El fin de vigencia no puede ser anterior al inicio",
                ));
            }
            Some(end)
        }
        None => None,
    };

    // Verificar si el código ya existe
    let promotions = repo.promotions();

    let existing = promotions
        .find_one(doc! { "code": &code })
        .await
        .log_error_context("verificando código de promoción existente")
        .map_err(|e| AppError::database("check_promotion_exists", e))?;

    if existing.is_some() {
        return Err(AppError::Conflict(
            "Ya existe una promoción con ese código".to_string(),
        ));
    }

    let promotion = PromotionDoc {
        id: None,
        code: code.clone(),
        discount_type: data.discount_type,
        discount_value: data.discount_value,
        vehicle_type_condition: data.vehicle_type_condition.clone(),
        location_condition: data.location_condition.clone(),
        min_rental_hours: data.min_rental_hours.map(LooseHours::Number),
        start_date,
        end_date,
        is_active: data.is_active.unwrap_or(true),
        created_at: MongoRepo::current_timestamp(),
    };

    let result = promotions
        .insert_one(promotion)
        .await
        .log_error_context("creando promoción")
        .map_err(|e| AppError::database("create_promotion", e))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Promoción creada correctamente",
        "code": code,
        "id": result.inserted_id.as_object_id().map(|id| id.to_hex())
    })))
}

/// Valida un código contra un vehículo y un rango y devuelve el descuento
///
/// Las reglas se evalúan en orden fijo (activa, vigencia, categoría, ciudad,
/// mínimo de horas) y cada una responde con su propio mensaje; el frontend
/// lo muestra tal cual para que el usuario sepa qué corregir.
///
/// # Respuesta
/// ```json
/// {
///   "code": "VERANO20",
///   "base_price": 300.0,
///   "discount": 60.0,
///   "total_price": 240.0
/// }
/// ```
///
/// # Errores
/// - `400 Bad Request`: IDs o fechas mal formados, rango inválido
/// - `404 Not Found`: vehículo o código inexistente
/// - `422 Unprocessable Entity`: promoción no elegible para este alquiler
/// - `500 Internal Server Error`: error de base de datos
#[post("/promotions/validate")]
async fn validate_promotion(
    repo: web::Data<MongoRepo>,
    data: web::Json<ValidatePromotion>,
) -> AppResult<impl Responder> {
    if data.code.trim().is_empty() {
        return Err(AppError::validation_field("code", "El código es requerido"));
    }

    let vehicle_id = ObjectId::parse_str(&data.vehicle_id)
        .map_err(|_| AppError::Validation("ID de vehículo inválido".to_string()))?;
    let start = parse_datetime(&data.start_date)?;
    let end = parse_datetime(&data.end_date)?;

    let vehicle = fetch_vehicle(repo.get_ref(), vehicle_id).await?;

    let quote = build_quote(
        repo.get_ref(),
        &vehicle,
        data.rental_type,
        start,
        end,
        Some(&data.code),
    )
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "code": quote.applied_code(),
        "base_price": round_to_cents(quote.base_price()),
        "discount": round_to_cents(quote.discount()),
        "total_price": round_to_cents(quote.total())
    })))
}

/// Configura las rutas relacionadas con promociones
///
/// # Rutas disponibles
/// - `POST /promotions` - Crear promoción
/// - `POST /promotions/validate` - Validar un código contra un alquiler
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_promotion);
    cfg.service(validate_promotion);
}
