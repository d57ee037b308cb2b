pub mod api;
pub mod config;
pub mod dedup;
pub mod enrichment;
pub mod event;
pub mod handler;
pub mod health;
pub mod origin;
pub mod processors;
pub mod prometheus;
pub mod records;
pub mod registry;
pub mod router;
pub mod salt;
pub mod sanitize;
pub mod server;
pub mod storage;
pub mod tenants;
pub mod time;
pub mod usage;
pub mod validation;
