mod cloud;
mod drive;
mod firebase;
mod google_auth;
mod local;
#[cfg(test)]
pub mod memory;
mod remote;
mod selector;

#[cfg(test)]
pub use cloud::{CloudStore, FolderOptions};
pub use remote::{RemoteStore, UploadRequest, UploadResult};
pub use selector::StoreSelector;
