use rocket::{
    Build, Config, Request, Rocket, catch, catchers,
    http::Status,
    response::{self, Responder},
    serde::json::Json,
};
use serde::Serialize;
use std::{net::IpAddr, sync::Arc};
use utilities::logger::{error, warn};

pub mod controller;
pub mod routes;

use crate::{
    api_service::routes::{chunkmaster, chunkserver},
    chunkserver::handler::ChunkserverHandler,
    error::ChunkmasterError,
    fid_allocator::FidAllocator,
};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorResponse {
    pub error: String,
}

impl ChunkmasterError {
    fn status(&self) -> Status {
        match self {
            ChunkmasterError::MalformedRequest(_) => Status::BadRequest,
            ChunkmasterError::NotFound(_) => Status::NotFound,
            ChunkmasterError::AlreadyExists(_)
            | ChunkmasterError::StatusConflict { .. }
            | ChunkmasterError::InvalidTransition { .. } => Status::Conflict,
            ChunkmasterError::FidExhausted | ChunkmasterError::Metadata(_) => {
                Status::InternalServerError
            }
        }
    }
}

impl<'r> Responder<'r, 'static> for ChunkmasterError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status == Status::InternalServerError {
            error!(error = %self, uri = %request.uri(), "Request failed");
        } else {
            warn!(error = %self, uri = %request.uri(), "Request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .respond_to(request)
    }
}

#[catch(default)]
fn default_catcher(status: Status, _request: &Request) -> (Status, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: status.reason_lossy().to_owned(),
        }),
    )
}

pub fn rocket(
    handler: Arc<ChunkserverHandler>,
    allocator: Arc<FidAllocator>,
    address: IpAddr,
    port: u16,
) -> Rocket<Build> {
    let config = Config {
        address,
        port,
        ..Config::default()
    };
    rocket::custom(config)
        .manage(handler)
        .manage(allocator)
        .mount("/v1/chunkserver", chunkserver::routes())
        .mount("/v1/chunkmaster", chunkmaster::routes())
        .register("/", catchers![default_catcher])
}
