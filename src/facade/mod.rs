mod database;

pub use database::TemporalDb;
