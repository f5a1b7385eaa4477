//! HTTP adapters for the central replica: document API client, object
//! storage gateway and connectivity probe.

mod client;
mod objects;
mod probe;

#[cfg(test)]
mod testing;

pub use client::RemoteStoreClient;
pub use objects::HttpObjectStore;
pub use probe::HttpConnectivityProbe;
