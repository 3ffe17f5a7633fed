// src/db/mod.rs
pub mod mongodb;

pub use mongodb::{Booking, BookingStatus, LooseHours, MongoRepo, PromotionDoc, Vehicle};
