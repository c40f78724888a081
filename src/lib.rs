//! Pureblog core: async request dispatch and micro-ORM for the blog platform.

pub mod config;
pub mod db;
pub mod error;
pub mod orm;
pub mod response;
pub mod schema;
pub mod web;

pub use config::DbConfig;
pub use db::Db;
pub use error::{ApiError, AppError, SchemaError};
pub use orm::{Entity, Limit, Model};
pub use response::{Reply, TemplateRenderer, REDIRECT_PREFIX, TEMPLATE_KEY};
pub use schema::{derive_schema, EntitySchema, Field, FieldDefault};
pub use web::{Binding, HandlerArgs, RequestContext, RouteTable};
