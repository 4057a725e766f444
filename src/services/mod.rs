pub mod access_urls;
pub mod asset_coordinator;
pub mod keys;
pub mod local_object_store;
pub mod metadata_store;
pub mod normalizer;
pub mod object_store;
pub mod signing;

#[cfg(test)]
pub mod testing;
