use crate::chunkmaster_state::chunkserver_details::Chunkserver;
use crate::chunkserver::{
    handler::ChunkserverHandler,
    request::{ChunkserverAddress, ChunkserverReport, InitChunkserverRequest},
};
use crate::error::ChunkmasterError;
use rocket::{State, get, post, serde::json::Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadResponse {
    pub loaded: usize,
}

#[post("/initserver", data = "<body>")]
pub async fn init_chunkserver(
    body: Json<InitChunkserverRequest>,
    handler: &State<Arc<ChunkserverHandler>>,
) -> Result<Json<Chunkserver>, ChunkmasterError> {
    let chunkserver = handler.init(body.into_inner()).await?;
    Ok(Json(Chunkserver::clone(&chunkserver)))
}

#[post("/reportinfo", data = "<body>")]
pub async fn report_chunkserver(
    body: Json<ChunkserverReport>,
    handler: &State<Arc<ChunkserverHandler>>,
) -> Result<Json<Chunkserver>, ChunkmasterError> {
    let chunkserver = handler.report(body.into_inner()).await?;
    Ok(Json(Chunkserver::clone(&chunkserver)))
}

#[post("/loadinfo")]
pub async fn load_chunkservers(
    handler: &State<Arc<ChunkserverHandler>>,
) -> Result<Json<LoadResponse>, ChunkmasterError> {
    let loaded = handler.reload().await?;
    Ok(Json(LoadResponse { loaded }))
}

/// "1" when some stored chunkserver is in error, "0" otherwise
#[get("/checkerror")]
pub async fn check_error(
    handler: &State<Arc<ChunkserverHandler>>,
) -> Result<&'static str, ChunkmasterError> {
    match handler.has_errored().await? {
        true => Ok("1"),
        false => Ok("0"),
    }
}

#[post("/reset", data = "<body>")]
pub async fn reset_chunkserver(
    body: Json<ChunkserverAddress>,
    handler: &State<Arc<ChunkserverHandler>>,
) -> Result<Json<Chunkserver>, ChunkmasterError> {
    let chunkserver = handler.reset(body.into_inner()).await?;
    Ok(Json(Chunkserver::clone(&chunkserver)))
}
