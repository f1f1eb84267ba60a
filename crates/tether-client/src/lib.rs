//! HTTP implementation of `KeyValueStore` against an etcd v2 endpoint.
//!
//! Every trait operation maps onto one request to `{endpoint}/v2/keys{key}`:
//!
//! | Operation | Method | Parameters |
//! |---|---|---|
//! | read | `GET` | `recursive`, `sorted` |
//! | set / create / CAS | `PUT` | `value`, `ttl`, `prevValue`, `prevIndex`, `prevExist` |
//! | create in order | `POST` | `value`, `ttl` |
//! | delete / CAD | `DELETE` | `recursive`, `dir`, `prevValue`, `prevIndex` |
//! | watch | `GET` | `wait=true`, `waitIndex`, `recursive` |
//!
//! Error bodies (`{errorCode, message, cause, index}`) are mapped onto
//! [`KeyValueStoreError`](tether_kv_types::KeyValueStoreError) variants.

mod client;
mod config;
mod wire;

pub use client::EtcdClient;
pub use config::ClientConfig;
