//! Group addressing.
//!
//! A [`Group`] is the destination of a publication: a name plus an optional
//! numeric id for compact wire encodings. Two groups are equal when both
//! parts are equal.

mod intern;

use std::{fmt, sync::Arc};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use intern::intern_name;

/// Name of the group carrying forwarded publications between boundaries.
pub const FORWARD_GROUP_NAME: &str = "plexus::InterProcessForwarder";
/// Name of the group carrying regex-only forwarded traffic.
pub const REGEX_GROUP_NAME: &str = "plexus::InterProcessRegexData";

/// Reserved group used by forwarders for outbound publications.
pub static FORWARD_GROUP: Lazy<Group> = Lazy::new(|| Group::new(FORWARD_GROUP_NAME));
/// Reserved group used for regex-subscription traffic.
pub static REGEX_GROUP: Lazy<Group> = Lazy::new(|| Group::new(REGEX_GROUP_NAME));

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Group {
    name: Arc<str>,
    numeric: Option<u32>,
}

impl Group {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: intern_name(name),
            numeric: None,
        }
    }

    /// Group with a numeric id for encodings that cannot afford a string.
    pub fn with_id(
        name: impl AsRef<str>,
        numeric: u32,
    ) -> Self {
        Self {
            name: intern_name(name),
            numeric: Some(numeric),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn numeric(&self) -> Option<u32> {
        self.numeric
    }

    /// True for the groups the forwarding layer keeps for itself.
    pub fn is_reserved(&self) -> bool {
        &*self.name == FORWARD_GROUP_NAME || &*self.name == REGEX_GROUP_NAME
    }
}

impl fmt::Display for Group {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.numeric {
            Some(id) => write!(f, "{}#{}", self.name, id),
            None => f.write_str(&self.name),
        }
    }
}

impl fmt::Debug for Group {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Group({self})")
    }
}

impl From<&str> for Group {
    fn from(name: &str) -> Self {
        Group::new(name)
    }
}

impl From<String> for Group {
    fn from(name: String) -> Self {
        Group::new(name)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
