use crate::api_service::controller::chunkserver;
use rocket::{Route, routes};

pub fn routes() -> Vec<Route> {
    routes![
        chunkserver::init_chunkserver,
        chunkserver::report_chunkserver,
        chunkserver::load_chunkservers,
        chunkserver::check_error,
        chunkserver::reset_chunkserver,
    ]
}
