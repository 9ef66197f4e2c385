//! Bowtie control-plane API.
//!
//! This module provides:
//! - Polymorphic wire entities (location, ports)
//! - The HTTP client with lazy cookie-session login
//! - Endpoint methods for sites, DNS, groups and policy
//! - The `ControlPlane` trait and remote state observation

pub mod client;
pub mod codec;
pub mod control_plane;
pub mod dns;
pub mod groups;
#[cfg(test)]
pub mod memory;
pub mod observer;
pub mod policy;
pub mod sites;
pub mod types;

pub use client::{API_PREFIX, BowtieClient, Credentials};
pub use codec::{
    LocationSpec, ResourceLocation, ResourcePorts, TaggedLocation, UntaggedLocation,
    decode_location, encode_location,
};
pub use control_plane::ControlPlane;
pub use observer::{ObservedState, StateObserver};
pub use types::*;
