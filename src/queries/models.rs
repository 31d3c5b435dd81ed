//! Row and argument types of the authors catalog.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub bio: Option<String>,
}

crate::impl_record! {
    Author, table = "author", {
        id: "id" => Int8 [generated],
        name: "name" => Text,
        bio: "bio" => Text [nullable],
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAuthorParams {
    pub name: String,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAuthorParams {
    pub id: i64,
    pub name: String,
    pub bio: Option<String>,
}
