//! # API de Reservas
//!
//! Este módulo maneja todas las operaciones relacionadas con reservas:
//! - Cotizar un alquiler (precio, descuento, disponibilidad) sin persistir
//! - Crear nuevas reservas
//! - Listar reservas con filtros opcionales
//! - Confirmar, cancelar y completar reservas
//!
//! La creación de una reserva ejecuta la verificación de disponibilidad y el
//! insert dentro de una misma transacción de sesión de MongoDB. La
//! transacción sola no basta: las lecturas corren sobre un snapshot sin
//! tomar locks, y dos intentos concurrentes que insertan documentos
//! distintos no chocan entre sí. Por eso la transacción escribe primero una
//! marca en el documento del vehículo; esa escritura compartida fuerza un
//! `WriteConflict` entre intentos sobre el mismo vehículo y los serializa:
//! solo el que gana llega a leer los cruces e insertar. La aplicación
//! original hacía el read y el write por separado y dejaba esa ventana
//! abierta.

use actix_web::{get, post, web, HttpResponse, Responder};
use mongodb::bson::{doc, oid::ObjectId, Document};
use serde::{Deserialize, Serialize};

use super::middleware::ErrorLogExt;
use super::{AppError, AppResult, ResultExt};
use crate::db::{Booking, BookingStatus, MongoRepo, Vehicle};
use crate::pricing::{round_to_cents, BookingError, Quote, RentalType};

/// Datos para cotizar un alquiler
///
/// Las fechas viajan como strings RFC 3339 y se parsean en esta capa.
#[derive(Deserialize)]
struct QuoteRequest {
    /// ID del vehículo (ObjectId como string)
    vehicle_id: String,
    /// Inicio del alquiler (RFC 3339)
    start_date: String,
    /// Fin del alquiler (RFC 3339)
    end_date: String,
    /// Modalidad de facturación: "days" u "hours"
    rental_type: RentalType,
    /// Código de promoción opcional
    promo_code: Option<String>,
}

/// Datos para crear una reserva: una cotización más el usuario que reserva
#[derive(Deserialize)]
struct MakeBooking {
    vehicle_id: String,
    /// ID del usuario que reserva (ObjectId como string)
    user_id: String,
    start_date: String,
    end_date: String,
    rental_type: RentalType,
    promo_code: Option<String>,
}

/// Desglose de precios que se devuelve al frontend
///
/// Los montos se redondean a 2 decimales recién aquí; el cálculo interno
/// trabaja sin redondeos intermedios.
#[derive(Serialize)]
struct QuoteResponse {
    vehicle_id: String,
    rental_type: RentalType,
    start_date: String,
    end_date: String,
    /// Unidades facturadas (días u horas según la modalidad)
    duration: i64,
    duration_hours: f64,
    base_price: f64,
    discount: f64,
    /// Código aplicado, si la promoción resultó elegible
    promo_code: Option<String>,
    total_price: f64,
}

/// Versión de una reserva para envío al frontend, con ObjectIds como strings
/// y fechas en RFC 3339
#[derive(Serialize)]
struct BookingResponse {
    id: String,
    vehicle_id: String,
    user_id: String,
    start_date: String,
    end_date: String,
    rental_type: RentalType,
    total_price: f64,
    promo_code: Option<String>,
    status: BookingStatus,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        BookingResponse {
            id: booking.id.map(|id| id.to_hex()).unwrap_or_default(),
            vehicle_id: booking.vehicle_id.to_hex(),
            user_id: booking.user_id.to_hex(),
            start_date: format_datetime(booking.start_date),
            end_date: format_datetime(booking.end_date),
            rental_type: booking.rental_type,
            total_price: booking.total_price,
            promo_code: booking.promo_code,
            status: booking.status,
        }
    }
}

/// Parámetros de consulta para listar reservas
#[derive(Deserialize)]
struct BookingQuery {
    /// Filtrar por vehículo (ObjectId como string)
    vehicle_id: Option<String>,
    /// Filtrar por usuario (ObjectId como string)
    user_id: Option<String>,
    /// Filtrar por estado ("pending", "confirmed", ...)
    status: Option<String>,
}

/// Valida y parsea una fecha RFC 3339 a unix segundos
///
/// # Errores
/// - `Validation`: si el formato es incorrecto
pub(crate) fn parse_datetime(value: &str) -> AppResult<i64> {
    let parsed = chrono::DateTime::parse_from_rfc3339(value)
        .map_err_validation("Formato de fecha inválido, use RFC 3339 (2026-01-15T10:00:00Z)")?;
    Ok(parsed.timestamp())
}

/// Formatea unix segundos como RFC 3339 para las respuestas
fn format_datetime(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// Filtro de reservas que bloquean un vehículo
///
/// Toda reserva cuyo estado no sea "cancelled" ocupa su rango.
fn active_bookings_filter(vehicle_id: ObjectId) -> Document {
    doc! {
        "vehicle_id": vehicle_id,
        "status": { "$ne": BookingStatus::Cancelled.as_str() }
    }
}

/// Update que marca el vehículo dentro de la transacción de reserva
///
/// Las transacciones de MongoDB solo detectan conflicto cuando dos de ellas
/// escriben el mismo documento; los inserts de reservas nuevas nunca chocan
/// entre sí. Escribir esta marca sobre el documento del vehículo es lo que
/// hace que dos intentos concurrentes sobre el mismo vehículo entren en
/// `WriteConflict` y uno de los dos aborte antes de leer los cruces.
fn booking_lock_update(now: i64) -> Document {
    doc! { "$set": { "last_booking_at": now } }
}

/// Traduce errores de la transacción de reserva
///
/// Un error con la etiqueta `TransientTransactionError` significa que otro
/// intento concurrente tocó el mismo vehículo y esta transacción fue
/// abortada; se responde 409 para que el cliente reintente. El resto son
/// errores de base de datos normales.
fn map_transaction_error(error: mongodb::error::Error) -> AppError {
    if error.contains_label(mongodb::error::TRANSIENT_TRANSACTION_ERROR) {
        AppError::Conflict(
            "Otro intento de reserva sobre este vehículo está en curso, intenta nuevamente"
                .to_string(),
        )
    } else {
        AppError::database("booking_transaction", error)
    }
}

/// Carga las reservas activas de un vehículo
///
/// La política ante errores de la base es fail-closed: si no se puede
/// consultar, se devuelve `StoreUnavailable` y ninguna reserva continúa. Es
/// preferible rechazar de más que aceptar una reserva sin haber podido
/// verificar los cruces.
pub(crate) async fn active_bookings_for_vehicle(
    repo: &MongoRepo,
    vehicle_id: ObjectId,
) -> AppResult<Vec<Booking>> {
    let bookings = repo.bookings();
    let cursor = bookings
        .find(active_bookings_filter(vehicle_id))
        .await
        .log_error_context("consultando reservas activas")
        .map_err(|_| AppError::Booking(BookingError::StoreUnavailable))?;

    let mut results = Vec::new();
    let mut cursor = cursor;

    while cursor
        .advance()
        .await
        .map_err(|_| AppError::Booking(BookingError::StoreUnavailable))?
    {
        // fail-closed también al deserializar: un documento ilegible impide
        // verificar los cruces igual que una consulta caída
        let booking = cursor
            .deserialize_current()
            .log_error_context("deserializando reserva activa")
            .map_err(|_| AppError::Booking(BookingError::StoreUnavailable))?;
        results.push(booking);
    }

    Ok(results)
}

/// Busca el vehículo o devuelve 404
pub(crate) async fn fetch_vehicle(repo: &MongoRepo, vehicle_id: ObjectId) -> AppResult<Vehicle> {
    repo.vehicles()
        .find_one(doc! { "_id": vehicle_id })
        .await
        .log_error_context("buscando vehículo")
        .map_err(|e| AppError::database("find_vehicle", e))?
        .ok_or_else(|| AppError::not_found_id("Vehículo", &vehicle_id.to_hex()))
}

/// Arma la cotización de un vehículo para un rango, aplicando la promoción
/// si se envió un código
///
/// El código se normaliza a mayúsculas antes de buscarlo, igual que al
/// crearlo, de modo que el match sea insensible a mayúsculas.
pub(crate) async fn build_quote(
    repo: &MongoRepo,
    vehicle: &Vehicle,
    rental_type: RentalType,
    start: i64,
    end: i64,
    promo_code: Option<&str>,
) -> AppResult<Quote> {
    let mut quote = Quote::new(vehicle.terms(), rental_type, start, end)?;

    if let Some(code) = promo_code {
        let code = code.trim().to_uppercase();
        if !code.is_empty() {
            let promo = repo
                .promotions()
                .find_one(doc! { "code": &code })
                .await
                .log_error_context("buscando promoción")
                .map_err(|e| AppError::database("find_promotion", e))?
                .ok_or(BookingError::PromoNotFound)?;

            quote.apply_promotion(&promo.terms(), MongoRepo::current_timestamp())?;
        }
    }

    Ok(quote)
}

fn quote_response(vehicle_id: ObjectId, quote: &Quote) -> QuoteResponse {
    QuoteResponse {
        vehicle_id: vehicle_id.to_hex(),
        rental_type: quote.rental_type(),
        start_date: format_datetime(quote.start()),
        end_date: format_datetime(quote.end()),
        duration: quote.duration(),
        duration_hours: quote.duration_hours(),
        base_price: round_to_cents(quote.base_price()),
        discount: round_to_cents(quote.discount()),
        promo_code: quote.applied_code().map(str::to_string),
        total_price: round_to_cents(quote.total()),
    }
}

/// Cotiza un alquiler sin crear la reserva
///
/// Calcula duración, precio base, descuento de la promoción (si se envió un
/// código) y verifica que el rango esté libre. Es el mismo cálculo que
/// ejecuta la creación; la página de detalle lo usa para mostrar el desglose
/// antes de confirmar.
///
/// # Respuesta
/// ```json
/// {
///   "vehicle_id": "507f1f77bcf86cd799439011",
///   "rental_type": "days",
///   "duration": 3,
///   "base_price": 300.0,
///   "discount": 60.0,
///   "promo_code": "VERANO20",
///   "total_price": 240.0
/// }
/// ```
///
/// # Errores
/// - `400 Bad Request`: fechas mal formadas o rango inválido
/// - `404 Not Found`: vehículo o código de promoción inexistente
/// - `409 Conflict`: el rango se cruza con una reserva activa
/// - `422 Unprocessable Entity`: promoción no elegible
/// - `503 Service Unavailable`: no se pudo verificar disponibilidad
#[post("/bookings/quote")]
async fn quote_booking(
    repo: web::Data<MongoRepo>,
    data: web::Json<QuoteRequest>,
) -> AppResult<impl Responder> {
    let vehicle_id = ObjectId::parse_str(&data.vehicle_id)
        .map_err(|_| AppError::Validation("ID de vehículo inválido".to_string()))?;
    let start = parse_datetime(&data.start_date)?;
    let end = parse_datetime(&data.end_date)?;

    let vehicle = fetch_vehicle(repo.get_ref(), vehicle_id).await?;

    // Primero el cálculo: un rango inválido se reporta como tal, no como
    // falta de disponibilidad
    let quote = build_quote(
        repo.get_ref(),
        &vehicle,
        data.rental_type,
        start,
        end,
        data.promo_code.as_deref(),
    )
    .await?;

    let active = active_bookings_for_vehicle(repo.get_ref(), vehicle_id).await?;
    if active.iter().any(|b| b.conflicts_with(start, end)) {
        return Err(BookingError::RangeUnavailable.into());
    }

    Ok(HttpResponse::Ok().json(quote_response(vehicle_id, &quote)))
}

/// Crea una nueva reserva
///
/// Recalcula la cotización del lado del servidor (el total que manda el
/// frontend no se usa) y ejecuta el chequeo de disponibilidad junto con el
/// insert dentro de una transacción de sesión que además marca el documento
/// del vehículo. Si dos clientes intentan reservar el mismo vehículo a la
/// vez, la marca compartida fuerza un conflicto de escritura y solo uno
/// confirma; el otro recibe 409 y puede reintentar.
///
/// # Respuesta
/// ```json
/// {
///   "message": "Reserva creada correctamente",
///   "id": "507f1f77bcf86cd799439011",
///   "status": "pending",
///   "total_price": 240.0
/// }
/// ```
///
/// # Errores
/// - `400 Bad Request`: IDs o fechas mal formados, rango inválido
/// - `404 Not Found`: vehículo o código de promoción inexistente
/// - `409 Conflict`: el rango se cruza con una reserva activa
/// - `422 Unprocessable Entity`: promoción no elegible
/// - `500 Internal Server Error`: error de base de datos
/// - `503 Service Unavailable`: no se pudo verificar disponibilidad
#[post("/bookings")]
async fn make_booking(
    repo: web::Data<MongoRepo>,
    data: web::Json<MakeBooking>,
) -> AppResult<impl Responder> {
    let vehicle_id = ObjectId::parse_str(&data.vehicle_id)
        .map_err(|_| AppError::Validation("ID de vehículo inválido".to_string()))?;
    let user_id = ObjectId::parse_str(&data.user_id)
        .map_err(|_| AppError::Validation("ID de usuario inválido".to_string()))?;
    let start = parse_datetime(&data.start_date)?;
    let end = parse_datetime(&data.end_date)?;

    let vehicle = fetch_vehicle(repo.get_ref(), vehicle_id).await?;

    // La cotización (precio y elegibilidad de la promoción) se resuelve antes
    // de abrir la transacción; adentro solo quedan el chequeo de cruces y el
    // insert, que son los que deben ser atómicos entre sí.
    let quote = build_quote(
        repo.get_ref(),
        &vehicle,
        data.rental_type,
        start,
        end,
        data.promo_code.as_deref(),
    )
    .await?;

    let mut session = repo
        .client
        .start_session()
        .await
        .map_err(|e| AppError::database("start_session", e))?;

    session
        .start_transaction()
        .await
        .map_err(|e| AppError::database("start_transaction", e))?;

    let current_time = MongoRepo::current_timestamp();

    // Escritura compartida ANTES de leer los cruces: las lecturas de la
    // transacción no bloquean, así que sin esto dos intentos concurrentes
    // leerían el mismo snapshot vacío e insertarían ambos
    repo.vehicles()
        .update_one(doc! { "_id": vehicle_id }, booking_lock_update(current_time))
        .session(&mut session)
        .await
        .map_err(map_transaction_error)?;

    let mut cursor = repo
        .bookings()
        .find(active_bookings_filter(vehicle_id))
        .session(&mut session)
        .await
        .log_error_context("consultando reservas activas en transacción")
        .map_err(|_| AppError::Booking(BookingError::StoreUnavailable))?;

    let mut conflict = false;
    while let Some(existing) = cursor.next(&mut session).await {
        let existing =
            existing.map_err(|_| AppError::Booking(BookingError::StoreUnavailable))?;
        if existing.conflicts_with(start, end) {
            conflict = true;
            break;
        }
    }

    if conflict {
        session.abort_transaction().await.ok();
        return Err(BookingError::RangeUnavailable.into());
    }

    let booking = Booking {
        id: None,
        vehicle_id,
        user_id,
        start_date: start,
        end_date: end,
        rental_type: data.rental_type,
        total_price: round_to_cents(quote.total()),
        promo_code: quote.applied_code().map(str::to_string),
        status: BookingStatus::Pending,
        created_at: current_time,
        updated_at: current_time,
    };

    let result = repo
        .bookings()
        .insert_one(&booking)
        .session(&mut session)
        .await
        .map_err(map_transaction_error)?;

    session
        .commit_transaction()
        .await
        .map_err(map_transaction_error)?;

    tracing::info!(
        vehicle_id = %vehicle_id.to_hex(),
        user_id = %user_id.to_hex(),
        total_price = booking.total_price,
        "Reserva creada"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Reserva creada correctamente",
        "id": result.inserted_id.as_object_id().map(|id| id.to_hex()),
        "status": BookingStatus::Pending.as_str(),
        "total_price": booking.total_price
    })))
}

/// Lista reservas con filtros opcionales
///
/// # Filtros disponibles
/// - `vehicle_id`: reservas de un vehículo
/// - `user_id`: reservas de un usuario
/// - `status`: por estado ("pending", "confirmed", ...)
///
/// # Errores
/// - `400 Bad Request`: ID mal formado o estado desconocido
/// - `500 Internal Server Error`: error de base de datos
#[get("/bookings")]
async fn get_bookings(
    repo: web::Data<MongoRepo>,
    query: web::Query<BookingQuery>,
) -> AppResult<impl Responder> {
    // Construir filtro dinámico basado en parámetros
    let mut filter = doc! {};

    if let Some(vehicle_id) = &query.vehicle_id {
        let vehicle_id = ObjectId::parse_str(vehicle_id)
            .map_err(|_| AppError::Validation("ID de vehículo inválido".to_string()))?;
        filter.insert("vehicle_id", vehicle_id);
    }

    if let Some(user_id) = &query.user_id {
        let user_id = ObjectId::parse_str(user_id)
            .map_err(|_| AppError::Validation("ID de usuario inválido".to_string()))?;
        filter.insert("user_id", user_id);
    }

    if let Some(status) = &query.status {
        let status = BookingStatus::parse(status).ok_or_else(|| {
            AppError::validation_field("status", "Estado de reserva desconocido")
        })?;
        filter.insert("status", status.as_str());
    }

    let bookings = repo.bookings();
    let cursor = bookings
        .find(filter)
        .await
        .map_err(|e| AppError::database("list_bookings", e))?;

    let mut results = Vec::new();
    let mut cursor = cursor;

    while cursor
        .advance()
        .await
        .map_err(|e| AppError::Internal(format!("Error iterando cursor: {}", e)))?
    {
        let booking = cursor
            .deserialize_current()
            .map_err_internal("Error deserializando reserva")?;
        results.push(BookingResponse::from(booking));
    }

    Ok(HttpResponse::Ok().json(results))
}

/// Cambia el estado de una reserva si su estado actual lo permite
///
/// El filtro de la actualización incluye el estado de partida, así el cambio
/// es atómico: si otra petición movió la reserva primero, `modified_count`
/// queda en 0 y se responde 404.
async fn transition_booking(
    repo: &MongoRepo,
    booking_id: ObjectId,
    allowed_from: Document,
    to: BookingStatus,
) -> AppResult<()> {
    let bookings = repo.bookings();
    let mut filter = allowed_from;
    filter.insert("_id", booking_id);

    let result = bookings
        .update_one(
            filter,
            doc! {
                "$set": {
                    "status": to.as_str(),
                    "updated_at": MongoRepo::current_timestamp()
                }
            },
        )
        .await
        .map_err(|e| AppError::database("transition_booking", e))?;

    if result.modified_count == 0 {
        return Err(AppError::NotFound(
            "Reserva no encontrada o ya procesada".to_string(),
        ));
    }

    Ok(())
}

/// Confirma una reserva pendiente o con pago en revisión
///
/// # Errores
/// - `400 Bad Request`: ID de reserva inválido
/// - `404 Not Found`: reserva no encontrada o en un estado no confirmable
/// - `500 Internal Server Error`: error de base de datos
#[post("/bookings/{id}/confirm")]
async fn confirm_booking(
    repo: web::Data<MongoRepo>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let booking_id = ObjectId::parse_str(&path.into_inner())
        .map_err(|_| AppError::Validation("ID de reserva inválido".to_string()))?;

    transition_booking(
        repo.get_ref(),
        booking_id,
        doc! {
            "status": { "$in": [
                BookingStatus::Pending.as_str(),
                BookingStatus::AwaitingConfirmation.as_str()
            ] }
        },
        BookingStatus::Confirmed,
    )
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Reserva confirmada correctamente",
        "id": booking_id.to_hex(),
        "status": BookingStatus::Confirmed.as_str()
    })))
}

/// Cancela una reserva
///
/// Una reserva cancelada libera su rango de fechas y no se puede reactivar.
/// Las reservas completadas tampoco se pueden cancelar.
///
/// # Errores
/// - `400 Bad Request`: ID de reserva inválido
/// - `404 Not Found`: reserva no encontrada, cancelada o completada
/// - `500 Internal Server Error`: error de base de datos
#[post("/bookings/{id}/cancel")]
async fn cancel_booking(
    repo: web::Data<MongoRepo>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let booking_id = ObjectId::parse_str(&path.into_inner())
        .map_err(|_| AppError::Validation("ID de reserva inválido".to_string()))?;

    transition_booking(
        repo.get_ref(),
        booking_id,
        doc! {
            "status": { "$nin": [
                BookingStatus::Cancelled.as_str(),
                BookingStatus::Completed.as_str()
            ] }
        },
        BookingStatus::Cancelled,
    )
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Reserva cancelada correctamente",
        "id": booking_id.to_hex(),
        "status": BookingStatus::Cancelled.as_str()
    })))
}

/// Marca como completada una reserva confirmada (el vehículo fue devuelto)
///
/// # Errores
/// - `400 Bad Request`: ID de reserva inválido
/// - `404 Not Found`: reserva no encontrada o no estaba confirmada
/// - `500 Internal Server Error`: error de base de datos
#[post("/bookings/{id}/complete")]
async fn complete_booking(
    repo: web::Data<MongoRepo>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let booking_id = ObjectId::parse_str(&path.into_inner())
        .map_err(|_| AppError::Validation("ID de reserva inválido".to_string()))?;

    transition_booking(
        repo.get_ref(),
        booking_id,
        doc! { "status": BookingStatus::Confirmed.as_str() },
        BookingStatus::Completed,
    )
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Reserva completada correctamente",
        "id": booking_id.to_hex(),
        "status": BookingStatus::Completed.as_str()
    })))
}

/// Configura las rutas relacionadas con reservas
///
/// # Rutas disponibles
/// - `POST /bookings/quote` - Cotizar sin crear la reserva
/// - `POST /bookings` - Crear nueva reserva
/// - `GET /bookings` - Listar reservas con filtros opcionales
/// - `POST /bookings/{id}/confirm` - Confirmar reserva
/// - `POST /bookings/{id}/cancel` - Cancelar reserva
/// - `POST /bookings/{id}/complete` - Completar reserva confirmada
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(quote_booking);
    cfg.service(make_booking);
    cfg.service(get_bookings);
    cfg.service(confirm_booking);
    cfg.service(cancel_booking);
    cfg.service(complete_booking);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn la_marca_de_reserva_escribe_el_documento_del_vehiculo() {
        // la transacción debe modificar un documento compartido por todos
        // los intentos sobre el mismo vehículo; inserts solos no chocan
        let update = booking_lock_update(1_000);
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_i64("last_booking_at").unwrap(), 1_000);
    }

    #[test]
    fn el_filtro_de_reservas_activas_excluye_solo_las_canceladas() {
        let vehicle_id = ObjectId::new();
        let filter = active_bookings_filter(vehicle_id);
        assert_eq!(filter.get_object_id("vehicle_id").unwrap(), vehicle_id);
        assert_eq!(
            filter.get_document("status").unwrap().get_str("$ne").unwrap(),
            "cancelled"
        );
    }
}
