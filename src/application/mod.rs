//! Application services: everything between HTTP and storage.

pub mod access;
pub mod archive;
pub mod context;
pub mod error;
pub mod feeds;
pub mod images;
pub mod jobs;
pub mod pages;
pub mod render;
pub mod repos;
pub mod settings;
pub mod site;
pub mod sitemap;
pub mod users;
