//! Building blocks attached to charts

pub mod gateway;
pub mod helm;
pub mod image;
pub mod include;
pub mod resource;

pub use gateway::{
    AllowedNamespaces, BackendRef, ExtensionRef, Gateway, GatewayClassSource, HttpRoute, Listener,
    PathType, RequestRedirect, RouteOptions,
};
pub use helm::{HelmChart, HelmRelease};
pub use image::ImageBuild;
pub use include::{Include, IncludeSource};
pub use resource::Resource;
