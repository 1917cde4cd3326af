pub mod config;
pub mod db;
pub mod error;
pub mod protocol;
pub mod router;
pub mod state;

pub mod crypto {
    pub mod aes;
    pub mod key;
    pub mod password;
    pub mod stream;
    pub mod token;
}

pub mod models {
    pub mod secret;
    pub mod user;
}

pub mod repositories {
    pub mod memory;
    pub mod metadata;
    pub mod postgres;
}

pub mod storage {
    pub mod blob;
    pub mod local;
    pub mod object;
}

pub mod services {
    pub mod auth;
    pub mod media;
    pub mod secrets;
}

pub mod handlers {
    pub mod auth;
    pub mod json;
    pub mod media;
    pub mod secrets;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod auth;
    pub mod secret;
}

pub mod client {
    pub mod config;
    pub mod connector;
    pub mod error;
    pub mod session;
    pub mod vault;
}
