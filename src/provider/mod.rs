//! Azure resource provider integration
//!
//! Static service mapping plus the live collaborators (token source and
//! provider operations API) used by the resolver's first tier.

pub mod catalog;
pub mod client;
pub mod credential;
pub mod mapper;
pub mod memo;

pub use catalog::{ProviderCatalog, ProviderOperation, ResourceType};
pub use client::{ArmClient, CatalogSource, ManagementEndpoint};
pub use credential::{AzCliCredential, CredentialProvider};
pub use memo::{MemoCatalogs, MemoCredential};
