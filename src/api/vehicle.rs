//! # API de Vehículos
//!
//! Operaciones sobre el catálogo de vehículos:
//! - Publicar un vehículo
//! - Listar el catálogo con filtros opcionales
//! - Consultar un vehículo puntual
//! - Verificar disponibilidad para un rango de fechas

use actix_web::{get, post, web, HttpResponse, Responder};
use mongodb::bson::{doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::booking::{active_bookings_for_vehicle, fetch_vehicle, parse_datetime};
use super::middleware::ErrorLogExt;
use super::{AppError, AppResult};
use crate::db::{MongoRepo, Vehicle};
use crate::pricing::validate_range;

/// Datos para publicar un vehículo
#[derive(Deserialize)]
struct RegisterVehicle {
    brand: String,
    model: String,
    year: i32,
    /// Categoría: "4x4", "Sedán", "Deportivo", "SUV", "Familiar", "Moto", "Compacto"
    category: String,
    price_per_day: f64,
    /// Si se omite, la tarifa horaria se deriva como `price_per_day / 8`
    price_per_hour: Option<f64>,
    /// Ciudad donde se entrega el vehículo
    location: String,
    description: Option<String>,
    image_url: Option<String>,
}

/// Versión de un vehículo para envío al frontend, con el ObjectId como string
#[derive(Serialize)]
struct VehicleResponse {
    id: String,
    brand: String,
    model: String,
    year: i32,
    category: String,
    price_per_day: f64,
    price_per_hour: Option<f64>,
    location: String,
    rating: f64,
    description: Option<String>,
    image_url: Option<String>,
}

impl From<Vehicle> for VehicleResponse {
    fn from(vehicle: Vehicle) -> Self {
        VehicleResponse {
            id: vehicle.id.map(|id| id.to_hex()).unwrap_or_default(),
            brand: vehicle.brand,
            model: vehicle.model,
            year: vehicle.year,
            category: vehicle.category,
            price_per_day: vehicle.price_per_day,
            price_per_hour: vehicle.price_per_hour,
            location: vehicle.location,
            rating: vehicle.rating,
            description: vehicle.description,
            image_url: vehicle.image_url,
        }
    }
}

/// Parámetros de consulta para listar vehículos
#[derive(Deserialize)]
struct VehicleQuery {
    /// Filtrar por categoría exacta
    category: Option<String>,
    /// Filtrar por ciudad exacta
    location: Option<String>,
}

/// Parámetros de la consulta de disponibilidad
#[derive(Deserialize)]
struct AvailabilityQuery {
    /// Inicio del rango (RFC 3339)
    start: String,
    /// Fin del rango (RFC 3339)
    end: String,
}

/// Publica un nuevo vehículo en el catálogo
///
/// # Respuesta
/// ```json
/// {
///   "message": "Vehículo publicado correctamente",
///   "id": "507f1f77bcf86cd799439011"
/// }
/// ```
///
/// # Errores
/// - `400 Bad Request`: datos de validación incorrectos
/// - `500 Internal Server Error`: error de base de datos
#[post("/vehicles")]
async fn register_vehicle(
    repo: web::Data<MongoRepo>,
    data: web::Json<RegisterVehicle>,
) -> AppResult<impl Responder> {
    // Validación básica
    if data.brand.trim().is_empty() || data.model.trim().is_empty() {
        return Err(AppError::Validation(
            "Marca y modelo son requeridos".to_string(),
        ));
    }

    if data.category.trim().is_empty() {
        return Err(AppError::validation_field(
            "category",
            "La categoría es requerida",
        ));
    }

    if data.location.trim().is_empty() {
        return Err(AppError::validation_field(
            "location",
            "La ciudad es requerida",
        ));
    }

    if data.price_per_day <= 0.0 {
        return Err(AppError::validation_field(
            "price_per_day",
            "El precio por día debe ser mayor a 0",
        ));
    }

    if let Some(price_per_hour) = data.price_per_hour {
        if price_per_hour < 0.0 {
            return Err(AppError::validation_field(
                "price_per_hour",
                "El precio por hora no puede ser negativo",
            ));
        }
    }

    let vehicle = Vehicle {
        id: None,
        brand: data.brand.trim().to_string(),
        model: data.model.trim().to_string(),
        year: data.year,
        category: data.category.trim().to_string(),
        price_per_day: data.price_per_day,
        price_per_hour: data.price_per_hour,
        location: data.location.trim().to_string(),
        rating: 0.0,
        description: data.description.clone(),
        image_url: data.image_url.clone(),
        last_booking_at: None,
        created_at: MongoRepo::current_timestamp(),
    };

    let result = repo
        .vehicles()
        .insert_one(vehicle)
        .await
        .log_error_context("publicando vehículo")
        .map_err(|e| AppError::database("register_vehicle", e))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Vehículo publicado correctamente",
        "id": result.inserted_id.as_object_id().map(|id| id.to_hex())
    })))
}

/// Lista el catálogo con filtros opcionales por categoría y ciudad
///
/// # Errores
/// - `500 Internal Server Error`: error de base de datos
#[get("/vehicles")]
async fn list_vehicles(
    repo: web::Data<MongoRepo>,
    query: web::Query<VehicleQuery>,
) -> AppResult<impl Responder> {
    // Construir filtro dinámico basado en parámetros
    let mut filter = doc! {};

    if let Some(category) = &query.category {
        filter.insert("category", category);
    }

    if let Some(location) = &query.location {
        filter.insert("location", location);
    }

    let vehicles = repo.vehicles();
    let cursor = vehicles
        .find(filter)
        .await
        .log_error_context("listando vehículos")
        .map_err(|e| AppError::database("list_vehicles", e))?;

    let mut results = Vec::new();
    let mut cursor = cursor;

    while cursor
        .advance()
        .await
        .map_err(|e| AppError::Internal(format!("Error iterando cursor: {}", e)))?
    {
        let vehicle = cursor
            .deserialize_current()
            .map_err(|e| AppError::Internal(format!("Error deserializando vehículo: {}", e)))?;
        results.push(VehicleResponse::from(vehicle));
    }

    Ok(HttpResponse::Ok().json(results))
}

/// Devuelve un vehículo puntual por su ID
///
/// # Errores
/// - `400 Bad Request`: ID mal formado
/// - `404 Not Found`: vehículo no encontrado
/// - `500 Internal Server Error`: error de base de datos
#[get("/vehicles/{id}")]
async fn get_vehicle(
    repo: web::Data<MongoRepo>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let vehicle_id = ObjectId::parse_str(&path.into_inner())
        .map_err(|_| AppError::Validation("ID de vehículo inválido".to_string()))?;

    let vehicle = fetch_vehicle(repo.get_ref(), vehicle_id).await?;

    Ok(HttpResponse::Ok().json(VehicleResponse::from(vehicle)))
}

/// Verifica si un vehículo está libre en un rango de fechas
///
/// El cruce de rangos es inclusivo: una reserva que termina exactamente
/// cuando empieza el rango consultado cuenta como conflicto. Si la base de
/// datos no responde, la consulta falla con 503 en lugar de responder
/// disponible (fail-closed).
///
/// # Respuesta
/// ```json
/// { "vehicle_id": "507f1f77bcf86cd799439011", "available": false }
/// ```
///
/// # Errores
/// - `400 Bad Request`: ID o fechas mal formadas, rango invertido o degenerado
/// - `404 Not Found`: vehículo no encontrado
/// - `503 Service Unavailable`: no se pudo consultar las reservas
#[get("/vehicles/{id}/availability")]
async fn check_availability(
    repo: web::Data<MongoRepo>,
    path: web::Path<String>,
    query: web::Query<AvailabilityQuery>,
) -> AppResult<impl Responder> {
    let vehicle_id = ObjectId::parse_str(&path.into_inner())
        .map_err(|_| AppError::Validation("ID de vehículo inválido".to_string()))?;
    let start = parse_datetime(&query.start)?;
    let end = parse_datetime(&query.end)?;

    // Un rango invertido no es "disponible": se rechaza antes de mirar los
    // cruces, igual que en la cotización
    validate_range(start, end)?;

    // El vehículo debe existir; una consulta sobre un ID desconocido es 404,
    // no "disponible"
    fetch_vehicle(repo.get_ref(), vehicle_id).await?;

    let active = active_bookings_for_vehicle(repo.get_ref(), vehicle_id).await?;
    let available = !active.iter().any(|b| b.conflicts_with(start, end));

    Ok(HttpResponse::Ok().json(json!({
        "vehicle_id": vehicle_id.to_hex(),
        "available": available
    })))
}

/// Configura las rutas relacionadas con vehículos
///
/// # Rutas disponibles
/// - `POST /vehicles` - Publicar un vehículo
/// - `GET /vehicles` - Listar con filtros opcionales
/// - `GET /vehicles/{id}` - Consultar un vehículo
/// - `GET /vehicles/{id}/availability` - Verificar disponibilidad
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(register_vehicle);
    cfg.service(list_vehicles);
    cfg.service(check_availability);
    cfg.service(get_vehicle);
}
