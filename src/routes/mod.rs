pub mod api_error;
pub mod config_routes;
pub mod data_routes;
pub mod gravfetch_routes;
pub mod info_routes;
pub mod job_routes;
pub mod ws_handler;

#[cfg(test)]
pub(crate) mod test_support;
