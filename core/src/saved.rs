use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use filterql::conversion;
use filterql::error::DecodeError;
use filterql::FilterGroup;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SavedFilterId(Uuid);

impl SavedFilterId {
    pub fn new() -> Self { Self(Uuid::new_v4()) }

    pub fn as_uuid(&self) -> &Uuid { &self.0 }
}

impl Default for SavedFilterId {
    fn default() -> Self { Self::new() }
}

impl From<Uuid> for SavedFilterId {
    fn from(uuid: Uuid) -> Self { Self(uuid) }
}

impl fmt::Display for SavedFilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl FromStr for SavedFilterId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Ok(Self(Uuid::parse_str(s)?)) }
}

/// The user a saved filter belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self { Self(id.to_string()) }
}

/// Which list a saved filter applies to (`filter_type` in storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterDomain {
    #[default]
    Clients,
    Conversations,
}

impl FilterDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterDomain::Clients => "clients",
            FilterDomain::Conversations => "conversations",
        }
    }
}

impl fmt::Display for FilterDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("unknown filter domain: {0}")]
pub struct UnknownDomain(pub String);

impl FromStr for FilterDomain {
    type Err = UnknownDomain;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clients" => Ok(FilterDomain::Clients),
            "conversations" => Ok(FilterDomain::Conversations),
            other => Err(UnknownDomain(other.to_string())),
        }
    }
}

/// A named filter tree. Never edited in place; replacing one deletes it and saves a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedFilter {
    pub id: SavedFilterId,
    pub name: String,
    pub filter: FilterGroup,
    pub owner: OwnerId,
    pub domain: FilterDomain,
    pub created_at: DateTime<Utc>,
}

/// A `saved_filters` row as the storage engines see it. `filter_data` is the tree's JSON text and is opaque to
/// storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedFilterRecord {
    pub id: SavedFilterId,
    pub name: String,
    pub filter_data: String,
    pub owner: OwnerId,
    pub domain: FilterDomain,
    pub created_at: DateTime<Utc>,
}

impl SavedFilter {
    pub fn to_record(&self) -> Result<SavedFilterRecord, StorageError> {
        Ok(SavedFilterRecord {
            id: self.id,
            name: self.name.clone(),
            filter_data: conversion::to_json_string(&self.filter)?,
            owner: self.owner.clone(),
            domain: self.domain,
            created_at: self.created_at,
        })
    }
}

impl TryFrom<SavedFilterRecord> for SavedFilter {
    type Error = DecodeError;

    fn try_from(record: SavedFilterRecord) -> Result<Self, Self::Error> {
        Ok(SavedFilter {
            id: record.id,
            filter: conversion::from_json_str(&record.filter_data)?,
            name: record.name,
            owner: record.owner,
            domain: record.domain,
            created_at: record.created_at,
        })
    }
}
