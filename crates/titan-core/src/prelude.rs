pub use crate::{errors::*, types::*};
pub use anyhow::{anyhow, Result};
pub use serde::{Deserialize, Serialize};
pub use tracing::{debug, error, info, warn};
