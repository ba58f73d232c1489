use crate::chunkmaster_state::state_snapshot::{ClusterStateSnapshot, RouteTable};
use crate::chunkserver::handler::ChunkserverHandler;
use crate::error::ChunkmasterError;
use crate::fid_allocator::{FidAllocator, FidRange};
use rocket::{State, get, serde::json::Json};
use std::sync::Arc;

#[get("/route")]
pub async fn route(handler: &State<Arc<ChunkserverHandler>>) -> Json<RouteTable> {
    Json(handler.route().await)
}

#[get("/fid")]
pub async fn allocate_fid(
    allocator: &State<Arc<FidAllocator>>,
) -> Result<Json<FidRange>, ChunkmasterError> {
    Ok(Json(allocator.allocate().await?))
}

#[get("/snapshot")]
pub async fn snapshot(handler: &State<Arc<ChunkserverHandler>>) -> Json<ClusterStateSnapshot> {
    Json(handler.state_snapshot().await)
}
