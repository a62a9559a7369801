pub mod admin;
pub mod models;
pub mod response;
pub mod routes;
