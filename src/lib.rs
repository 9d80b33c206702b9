pub mod config;
pub mod engine;
pub mod layout;
pub mod limits;
pub mod model;
pub mod observability;
pub mod refresh;
pub mod room;
pub mod slots;
pub mod sql;
pub mod view;
pub mod wire;
