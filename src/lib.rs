pub mod config;
pub mod db;
pub mod error;
pub mod state;
pub mod sync;
pub mod validation;

pub mod models {
    pub mod auth;
    pub mod partnership;
    pub mod reward;
    pub mod session;
    pub mod task;
}

pub mod repositories {
    pub mod partnership;
    pub mod profile;
    pub mod reward;
    pub mod session;
    pub mod task;
}

pub mod services {
    pub mod backend;
    pub mod partnerships;
    pub mod realtime;
    pub mod rewards;
    pub mod sessions;
    pub mod tasks;
}

pub mod handlers {
    pub mod live;
    pub mod partnerships;
    pub mod response;
    pub mod rewards;
    pub mod sessions;
    pub mod tasks;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

pub mod app;
