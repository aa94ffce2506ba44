//! Elastic build-agent capacity on Yandex Compute Cloud.
//!
//! The crate drives the lifecycle of virtual machines created from declared
//! images: naming, quota checks, creation with compensation, restart and
//! termination, plus periodic reconciliation of what the provider reports
//! against what each image tracks locally.

pub mod api;
pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod image;
pub mod models;
pub mod services;
pub mod utils;

pub use client::CloudClient;
pub use connector::{CloudConnector, ConnectorSettings, YandexConnector};
pub use error::{CloudError, InstanceError, Result};
pub use image::{CloudImage, CloudInstance, FileIdProvider, IdProvider, ImageDetails, ImageHandler};
