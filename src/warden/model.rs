use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    FileType,
    UrlScheme,
}

impl AssociationKind {
    pub fn all() -> &'static [AssociationKind] {
        &[AssociationKind::FileType, AssociationKind::UrlScheme]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileType => "file_type",
            Self::UrlScheme => "url_scheme",
        }
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssociationKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "file_type" | "filetype" | "file" | "type" => Ok(Self::FileType),
            "url_scheme" | "urlscheme" | "scheme" | "url" => Ok(Self::UrlScheme),
            other => anyhow::bail!("unknown association kind `{other}`; use file-type or url-scheme"),
        }
    }
}

/// Key of one association: identifiers are unique within their kind only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssociationKey {
    pub kind: AssociationKind,
    pub identifier: String,
}

impl AssociationKey {
    pub fn new(kind: AssociationKind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.identifier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Association {
    pub identifier: String,
    pub kind: AssociationKind,
    pub current_handler: Option<String>,
    pub available_handlers: Vec<String>,
}

impl Association {
    pub fn key(&self) -> AssociationKey {
        AssociationKey::new(self.kind, self.identifier.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerInfo {
    pub name: String,
    pub icon_ref: Option<String>,
}

/// A handler as recorded in history: the id is the canonical key, the name is
/// kept so entries stay readable after the application is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRef {
    pub id: String,
    pub name: String,
}

impl HandlerRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.id {
            f.write_str(&self.id)
        } else {
            write!(f, "{} ({})", self.name, self.id)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalChange {
    pub kind: AssociationKind,
    pub identifier: String,
    pub old: HandlerRef,
    pub new: HandlerRef,
}

impl ExternalChange {
    pub fn key(&self) -> AssociationKey {
        AssociationKey::new(self.kind, self.identifier.clone())
    }
}
