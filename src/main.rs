//! # AutoRenta Reservation Server
//!
//! Backend del marketplace de alquiler de vehículos, construido con Rust,
//! Actix Web y MongoDB.
//!
//! ## Características principales
//!
//! - **Catálogo de vehículos**: publicación y búsqueda con filtros
//! - **Cotización de alquileres**: duración, tarifa por día u hora,
//!   promociones y precio final en un solo cálculo
//! - **Reservas**: creación con chequeo de disponibilidad transaccional y
//!   ciclo de estados (pendiente → confirmada → completada / cancelada)
//! - **Promociones**: códigos con condiciones de categoría, ciudad, vigencia
//!   y duración mínima
//!
//! ## Configuración
//!
//! El servidor se configura mediante variables de entorno (archivo `.env`):
//!
//! ```env
//! # Base de datos MongoDB
//! MONGODB_URI=mongodb://localhost:27017
//! MONGODB_DATABASE=autorenta_reservation
//!
//! # Servidor
//! BIND_ADDRESS=0.0.0.0:8080
//!
//! # Logging
//! RUST_LOG=debug,mongodb=info
//! ```
//!
//! ## Ejecución
//!
//! ```bash
//! # 1. Instalar y ejecutar MongoDB (las transacciones requieren replica set)
//! # Docker: docker run -d --name mongo -p 27017:27017 mongo:latest --replSet rs0
//!
//! # 2. Configurar variables de entorno
//! cp .env.example .env
//!
//! # 3. Compilar y ejecutar
//! cargo run
//! ```

use actix_web::{middleware::Logger, web, App, HttpServer};
use std::env;

mod api;
mod db;
mod pricing;

/// Función principal que inicia el servidor web
///
/// # Funcionalidad
///
/// 1. Carga variables de entorno desde `.env`
/// 2. Configura el sistema de logging con tracing
/// 3. Establece conexión con MongoDB
/// 4. Crea índices en la base de datos
/// 5. Configura el servidor HTTP con middleware de logging y las rutas de la API
/// 6. Inicia el servidor en la dirección especificada
///
/// # Variables de entorno
///
/// - `MONGODB_URI`: URI de conexión a MongoDB (default: mongodb://localhost:27017)
/// - `MONGODB_DATABASE`: Nombre de la base de datos (default: autorenta_reservation)
/// - `BIND_ADDRESS`: Dirección y puerto del servidor (default: 0.0.0.0:8080)
/// - `RUST_LOG`: Nivel de logging (default: debug para la app, info para MongoDB)
///
/// # Errores
///
/// Retorna `std::io::Error` si:
/// - No se puede conectar a MongoDB
/// - No se puede bindear al puerto especificado
/// - Error general al inicializar el servidor
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    // Configurar sistema de logging con tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("autorenta_reservation=debug".parse().unwrap())
                .add_directive("mongodb=info".parse().unwrap()),
        )
        .init();

    tracing::info!("Iniciando AutoRenta Reservation Server con MongoDB...");

    // Inicializar conexión a MongoDB
    let mongo_repo = match db::MongoRepo::init().await {
        Ok(repo) => {
            tracing::info!("Conexión a MongoDB establecida exitosamente");

            // Intentar crear índices para optimizar consultas
            if let Err(e) = repo.create_indexes().await {
                tracing::warn!("Advertencia creando índices: {}", e);
                // No es un error fatal, continuamos sin índices
            }

            repo
        }
        Err(e) => {
            tracing::error!("Error conectando a MongoDB: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Error de MongoDB: {}", e),
            ));
        }
    };

    // Obtener dirección de bind desde variables de entorno
    let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    tracing::info!("Servidor iniciando en {}", bind_address);

    // Crear y configurar el servidor HTTP
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(mongo_repo.clone()))
            .wrap(Logger::default())
            .configure(api::init_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
