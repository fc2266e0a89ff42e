//! Template layout catalog
//!
//! Layouts are read from the stored template document
//! (`presentationData.layouts[].pageElements[]`). Every page element that
//! carries a `placeholder` block contributes one [`Placeholder`] to its layout.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of placeholder a layout exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaceholderKind {
    Title,
    CenteredTitle,
    Subtitle,
    Body,
    Picture,
    SlideNumber,
    Other,
}

impl PlaceholderKind {
    /// Wire name as it appears in template documents and plans
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "TITLE",
            Self::CenteredTitle => "CENTERED_TITLE",
            Self::Subtitle => "SUBTITLE",
            Self::Body => "BODY",
            Self::Picture => "PICTURE",
            Self::SlideNumber => "SLIDE_NUMBER",
            Self::Other => "OTHER",
        }
    }

    /// Lenient parse used for template documents: kinds this pipeline never
    /// fills collapse to `Other`.
    pub fn from_template(raw: &str) -> Self {
        raw.parse().unwrap_or(Self::Other)
    }

    pub fn is_title(&self) -> bool {
        matches!(self, Self::Title | Self::CenteredTitle)
    }
}

impl fmt::Display for PlaceholderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlaceholderKind {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TITLE" => Ok(Self::Title),
            "CENTERED_TITLE" => Ok(Self::CenteredTitle),
            "SUBTITLE" => Ok(Self::Subtitle),
            "BODY" => Ok(Self::Body),
            "PICTURE" => Ok(Self::Picture),
            "SLIDE_NUMBER" => Ok(Self::SlideNumber),
            "OTHER" => Ok(Self::Other),
            other => Err(RoleParseError::UnknownKind(other.to_string())),
        }
    }
}

/// Error parsing a placeholder role such as `BODY:1`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleParseError {
    #[error("unknown placeholder kind '{0}'")]
    UnknownKind(String),

    #[error("invalid placeholder index '{0}'")]
    InvalidIndex(String),
}

/// A placeholder slot on a layout: its kind plus the optional index that
/// disambiguates several placeholders of the same kind.
///
/// Serialized as `"TITLE"` or `"BODY:1"` so it can key JSON maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlaceholderRole {
    pub kind: PlaceholderKind,
    pub index: Option<u32>,
}

impl PlaceholderRole {
    pub fn new(kind: PlaceholderKind, index: Option<u32>) -> Self {
        Self { kind, index }
    }

    /// Role without an index (single placeholder of this kind)
    pub fn kind(kind: PlaceholderKind) -> Self {
        Self { kind, index: None }
    }

    pub fn indexed(kind: PlaceholderKind, index: u32) -> Self {
        Self {
            kind,
            index: Some(index),
        }
    }

    /// Parse the two-level `TYPE -> index` keys used by plan documents.
    ///
    /// An empty index, `null` or `None` means "no index".
    pub fn from_parts(kind: &str, index: &str) -> Result<Self, RoleParseError> {
        Ok(Self {
            kind: kind.parse()?,
            index: parse_index_key(index)?,
        })
    }
}

fn parse_index_key(raw: &str) -> Result<Option<u32>, RoleParseError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") || raw == "None" {
        return Ok(None);
    }
    raw.parse::<u32>()
        .map(Some)
        .map_err(|_| RoleParseError::InvalidIndex(raw.to_string()))
}

impl fmt::Display for PlaceholderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}:{}", self.kind, index),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl FromStr for PlaceholderRole {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((kind, index)) => Self::from_parts(kind, index),
            None => Self::from_parts(s, ""),
        }
    }
}

impl TryFrom<String> for PlaceholderRole {
    type Error = RoleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PlaceholderRole> for String {
    fn from(role: PlaceholderRole) -> Self {
        role.to_string()
    }
}

/// One placeholder element on a layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub kind: PlaceholderKind,
    pub index: Option<u32>,
    /// Page element id of the placeholder on the layout
    pub object_id: String,
}

impl Placeholder {
    pub fn role(&self) -> PlaceholderRole {
        PlaceholderRole::new(self.kind, self.index)
    }
}

/// A layout of the template and the placeholders it exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateLayout {
    pub layout_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Natural-language explanation of what the layout is for, if one was generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub placeholders: Vec<Placeholder>,
}

impl TemplateLayout {
    pub fn new(layout_id: impl Into<String>, placeholders: Vec<Placeholder>) -> Self {
        Self {
            layout_id: layout_id.into(),
            name: None,
            description: None,
            placeholders,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Role -> layout element id. A later duplicate role wins.
    pub fn placeholder_map(&self) -> BTreeMap<PlaceholderRole, String> {
        self.placeholders
            .iter()
            .map(|p| (p.role(), p.object_id.clone()))
            .collect()
    }

    pub fn has_role(&self, role: &PlaceholderRole) -> bool {
        self.placeholders.iter().any(|p| p.role() == *role)
    }

    /// Roles of the given kind, in index order
    pub fn roles_of_kind(&self, kind: PlaceholderKind) -> Vec<PlaceholderRole> {
        let mut roles: Vec<PlaceholderRole> = self
            .placeholders
            .iter()
            .filter(|p| p.kind == kind)
            .map(Placeholder::role)
            .collect();
        roles.sort();
        roles.dedup();
        roles
    }

    pub fn explanation(&self) -> LayoutExplanation {
        let mut roles: Vec<PlaceholderRole> =
            self.placeholders.iter().map(Placeholder::role).collect();
        roles.sort();
        roles.dedup();
        LayoutExplanation {
            layout_id: self.layout_id.clone(),
            name: self.name.clone(),
            roles,
            description: self.description.clone(),
        }
    }
}

/// What the planning collaborator is told about each layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutExplanation {
    pub layout_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub roles: Vec<PlaceholderRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Error loading a catalog from a template document
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("template document has no presentationData")]
    MissingPresentationData,

    #[error("template document is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// All layouts of the template in use, keyed by layout id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutCatalog {
    layouts: BTreeMap<String, TemplateLayout>,
}

impl LayoutCatalog {
    pub fn new(layouts: impl IntoIterator<Item = TemplateLayout>) -> Self {
        Self {
            layouts: layouts
                .into_iter()
                .map(|l| (l.layout_id.clone(), l))
                .collect(),
        }
    }

    /// Build the catalog from a stored template document.
    ///
    /// Layouts without an `objectId` are skipped. Placeholder indices may be
    /// plain numbers, numeric strings or extended-JSON wrappers such as
    /// `{"$numberInt": "1"}`.
    pub fn from_template_document(doc: &Value) -> Result<Self, CatalogError> {
        let data = doc
            .get("presentationData")
            .filter(|v| !v.is_null())
            .ok_or(CatalogError::MissingPresentationData)?;

        let mut layouts = Vec::new();
        for layout in data
            .get("layouts")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let Some(layout_id) = layout
                .get("objectId")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
            else {
                continue;
            };

            let mut placeholders = Vec::new();
            for element in layout
                .get("pageElements")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let placeholder = element
                    .get("shape")
                    .and_then(|shape| shape.get("placeholder"))
                    .or_else(|| element.get("image").and_then(|img| img.get("placeholder")));
                let Some(placeholder) = placeholder else {
                    continue;
                };

                placeholders.push(Placeholder {
                    kind: PlaceholderKind::from_template(
                        placeholder
                            .get("type")
                            .and_then(Value::as_str)
                            .unwrap_or("OTHER"),
                    ),
                    index: placeholder.get("index").and_then(coerce_index),
                    object_id: element
                        .get("objectId")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                });
            }

            let props = layout.get("layoutProperties");
            layouts.push(TemplateLayout {
                layout_id: layout_id.to_string(),
                name: props
                    .and_then(|p| p.get("displayName").or_else(|| p.get("name")))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                description: layout
                    .get("explanation")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                placeholders,
            });
        }

        Ok(Self::new(layouts))
    }

    /// Parse a template document from its JSON text
    pub fn from_template_json(json: &str) -> Result<Self, CatalogError> {
        let doc: Value = serde_json::from_str(json)?;
        Self::from_template_document(&doc)
    }

    pub fn get(&self, layout_id: &str) -> Option<&TemplateLayout> {
        self.layouts.get(layout_id)
    }

    pub fn contains(&self, layout_id: &str) -> bool {
        self.layouts.contains_key(layout_id)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    pub fn layouts(&self) -> impl Iterator<Item = &TemplateLayout> {
        self.layouts.values()
    }

    pub fn explanations(&self) -> Vec<LayoutExplanation> {
        self.layouts.values().map(TemplateLayout::explanation).collect()
    }
}

fn coerce_index(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| *f >= 0.0)
            .map(|f| f as u32),
        Value::Object(map) => ["$numberInt", "$numberDouble", "$numberLong"]
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(coerce_index),
        _ => None,
    }
}
