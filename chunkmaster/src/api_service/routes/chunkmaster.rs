use crate::api_service::controller::chunkmaster;
use rocket::{Route, routes};

pub fn routes() -> Vec<Route> {
    routes![chunkmaster::route, chunkmaster::allocate_fid, chunkmaster::snapshot]
}
