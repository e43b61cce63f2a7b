use super::etag::{EntityTag, Taggable};
use crate::error::ApiError;

/// Parsed `If-Match` / `If-None-Match` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// `*`, satisfied by any existing entity.
    Any,
    Tags(Vec<String>),
}

impl Precondition {
    /// Returns `None` for an absent or blank header.
    pub fn parse(header: Option<&str>) -> Option<Self> {
        let header = header?.trim();
        if header.is_empty() {
            return None;
        }
        if header == "*" {
            return Some(Self::Any);
        }

        let tags: Vec<String> = header
            .split(',')
            .map(|value| {
                let value = value.trim();
                let value = value.strip_prefix("W/").unwrap_or(value);
                value.trim_matches('"').to_owned()
            })
            .filter(|value| !value.is_empty())
            .collect();

        if tags.is_empty() {
            None
        } else {
            Some(Self::Tags(tags))
        }
    }

    /// Precondition for a write that may not proceed without one.
    pub fn required(header: Option<&str>) -> Result<Self, ApiError> {
        Self::parse(header).ok_or_else(|| {
            log::warn!("Rejected write without If-Match");
            ApiError::PreconditionRequired
        })
    }

    pub fn matches(&self, tag: &EntityTag) -> bool {
        match self {
            Self::Any => true,
            Self::Tags(tags) => tags.iter().any(|value| value == tag.as_str()),
        }
    }

    pub fn check_tag(&self, tag: &EntityTag) -> Result<(), ApiError> {
        if self.matches(tag) {
            log::debug!("Precondition satisfied ({tag})");
            Ok(())
        } else {
            log::warn!("Precondition failed, current tag is {tag}");
            Err(ApiError::PreconditionFailed)
        }
    }

    pub fn check<T: Taggable>(&self, entity: &T) -> Result<EntityTag, ApiError> {
        let tag = EntityTag::of(entity);
        self.check_tag(&tag)?;
        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Tag;

    fn tag() -> Tag {
        Tag {
            id: 2,
            name: String::from("vegetarian"),
        }
    }

    #[test]
    fn blank_headers_are_missing() {
        assert_eq!(Precondition::parse(None), None);
        assert_eq!(Precondition::parse(Some("")), None);
        assert_eq!(Precondition::parse(Some("   ")), None);
        assert_eq!(Precondition::parse(Some("\"\"")), None);
        assert!(matches!(
            Precondition::required(Some("")),
            Err(ApiError::PreconditionRequired)
        ));
    }

    #[test]
    fn quoted_bare_and_weak_forms_match() {
        let current = EntityTag::of(&tag());

        for header in [
            current.header_value(),
            current.as_str().to_owned(),
            format!("W/{}", current.header_value()),
            format!("\"stale\", {}", current.header_value()),
            String::from("*"),
        ] {
            let precondition = Precondition::parse(Some(&header)).unwrap();
            assert!(precondition.matches(&current), "{header}");
        }
    }

    #[test]
    fn stale_tag_fails() {
        let stale = EntityTag::of(&tag());
        let renamed = Tag {
            name: String::from("vegan"),
            ..tag()
        };

        let precondition = Precondition::parse(Some(&stale.header_value())).unwrap();

        assert!(precondition.check(&tag()).is_ok());
        assert!(matches!(
            precondition.check(&renamed),
            Err(ApiError::PreconditionFailed)
        ));
    }
}
