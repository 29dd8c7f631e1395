pub mod etcd;

use serde::{Deserialize, Serialize};

/// The envelope every cluster API response is wrapped in.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Response<T> {
    pub code: u16,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}
