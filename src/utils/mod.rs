pub mod user_status_cache;
