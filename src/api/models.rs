use serde::Serialize;

use crate::sites::EndpointInfo;

#[derive(Serialize)]
pub struct ListResponse {
    pub total: usize,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub deleted: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
