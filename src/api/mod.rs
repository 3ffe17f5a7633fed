//! # Módulo API
//!
//! Este módulo contiene todas las rutas y controladores de la API REST.
//!
//! ## Módulos principales
//!
//! - [`vehicle`] - Catálogo de vehículos (publicar, listar, disponibilidad)
//! - [`booking`] - Reservas (cotizar, crear, confirmar, cancelar, completar)
//! - [`promotion`] - Códigos promocionales (crear, validar)
//! - [`errors`] - Manejo de errores de la aplicación

pub mod booking;
pub mod errors;
mod middleware;
pub mod promotion;
pub mod vehicle;

// Re-exportar tipos comunes para facilitar su uso
pub use errors::{AppError, AppResult, ResultExt};

use actix_web::{get, web, HttpResponse, Responder};

/// Endpoint de salud para monitoreo
#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Configura todas las rutas de la API
///
/// ## Rutas configuradas
///
/// - `/vehicles/*` - Ver [`vehicle::routes`]
/// - `/bookings/*` - Ver [`booking::routes`]
/// - `/promotions/*` - Ver [`promotion::routes`]
/// - `/health` - Liveness
///
/// # Parámetros
///
/// - `cfg`: Configuración del servicio Actix Web donde se registran las rutas
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    booking::routes(cfg);
    vehicle::routes(cfg);
    promotion::routes(cfg);
    cfg.service(health);
}
