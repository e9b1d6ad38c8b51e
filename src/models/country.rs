use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::trip::CountryId;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Country {
    pub id: CountryId,
    pub name: String,
    pub code: String,
}
