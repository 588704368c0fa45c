//! Topic name and topic filter checks used by the PUBLISH, SUBSCRIBE and
//! UNSUBSCRIBE validators.

const SEPARATOR: char = '/';
const MULTI_LEVEL: char = '#';
const SINGLE_LEVEL: char = '+';
const SHARE_PREFIX: &str = "$share/";

/// UTF-8 strings on the wire carry a u16 length.
pub const MAX_TOPIC_LEN: usize = u16::MAX as usize;

/// Kind of a topic filter that passed validation, e.g.
/// `$share/group/home/+` is [`TopicFilter::SharedWildcard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicFilter {
    Concrete,
    Wildcard,
    SharedConcrete,
    SharedWildcard,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TopicParseError {
    #[error("topic is empty")]
    EmptyTopic,
    #[error("topic is longer than 65535 bytes")]
    TopicTooLong,
    #[error("'#' may only be the last level of a filter")]
    MultilevelWildcardNotAtEnd,
    #[error("a wildcard must occupy a whole level")]
    InvalidWildcardLevel,
    #[error("share name contains a wildcard")]
    InvalidSharedGroupName,
    #[error("share name is empty")]
    EmptySharedGroupName,
    #[error("topic name contains a wildcard or NUL")]
    WildcardOrNullInTopic,
}

fn is_wildcard(c: char) -> bool {
    c == SINGLE_LEVEL || c == MULTI_LEVEL
}

/// Checks level by level; `Ok(true)` if some level is a wildcard.
fn has_wildcard_level(filter: &str) -> Result<bool, TopicParseError> {
    let mut wildcard = false;
    for level in filter.split(SEPARATOR) {
        match level.len() {
            1 if level.starts_with(is_wildcard) => wildcard = true,
            _ if level.contains(is_wildcard) => {
                return Err(TopicParseError::InvalidWildcardLevel)
            }
            _ => {}
        }
    }
    Ok(wildcard)
}

pub fn validate_topic_filter(filter: &str) -> Result<TopicFilter, TopicParseError> {
    if filter.is_empty() {
        return Err(TopicParseError::EmptyTopic);
    }
    if filter.len() > MAX_TOPIC_LEN {
        return Err(TopicParseError::TopicTooLong);
    }
    if filter.contains('\0') {
        return Err(TopicParseError::WildcardOrNullInTopic);
    }
    if filter.find(MULTI_LEVEL).is_some_and(|pos| pos + 1 != filter.len()) {
        return Err(TopicParseError::MultilevelWildcardNotAtEnd);
    }

    let Some(shared) = filter.strip_prefix(SHARE_PREFIX) else {
        return Ok(if has_wildcard_level(filter)? {
            TopicFilter::Wildcard
        } else {
            TopicFilter::Concrete
        });
    };

    let (share_name, rest) = match shared.split_once(SEPARATOR) {
        Some(parts) => parts,
        None if shared.is_empty() => return Err(TopicParseError::EmptySharedGroupName),
        None => return Err(TopicParseError::EmptyTopic),
    };
    if share_name.is_empty() {
        return Err(TopicParseError::EmptySharedGroupName);
    }
    if share_name.contains(is_wildcard) {
        return Err(TopicParseError::InvalidSharedGroupName);
    }
    if rest.is_empty() {
        return Err(TopicParseError::EmptyTopic);
    }
    Ok(if has_wildcard_level(rest)? {
        TopicFilter::SharedWildcard
    } else {
        TopicFilter::SharedConcrete
    })
}

/// Topic names used by publishers. An empty name passes; PUBLISH decides
/// whether a topic alias stands in for it.
pub fn validate_topic_name(topic: &str) -> Result<(), TopicParseError> {
    if topic.len() > MAX_TOPIC_LEN {
        return Err(TopicParseError::TopicTooLong);
    }
    if topic.contains(|c: char| is_wildcard(c) || c == '\0') {
        return Err(TopicParseError::WildcardOrNullInTopic);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_name() {
        assert!(validate_topic_name("home/kitchen").is_ok());
        assert!(validate_topic_name("").is_ok());
        assert_eq!(
            validate_topic_name("home/+"),
            Err(TopicParseError::WildcardOrNullInTopic)
        );
        assert_eq!(
            validate_topic_name("home\0"),
            Err(TopicParseError::WildcardOrNullInTopic)
        );
    }

    #[test]
    fn test_topic_filter() {
        assert_eq!(validate_topic_filter("a/b"), Ok(TopicFilter::Concrete));
        assert_eq!(validate_topic_filter("a/+/c"), Ok(TopicFilter::Wildcard));
        assert_eq!(validate_topic_filter("#"), Ok(TopicFilter::Wildcard));
        assert_eq!(
            validate_topic_filter("$share/group/a/#"),
            Ok(TopicFilter::SharedWildcard)
        );
        assert_eq!(
            validate_topic_filter("$share/group/a"),
            Ok(TopicFilter::SharedConcrete)
        );
    }

    #[test]
    fn test_invalid_topic_filter() {
        assert_eq!(validate_topic_filter(""), Err(TopicParseError::EmptyTopic));
        assert_eq!(
            validate_topic_filter("a/#/b"),
            Err(TopicParseError::MultilevelWildcardNotAtEnd)
        );
        assert_eq!(
            validate_topic_filter("a/b+"),
            Err(TopicParseError::InvalidWildcardLevel)
        );
        assert_eq!(
            validate_topic_filter("$share/"),
            Err(TopicParseError::EmptySharedGroupName)
        );
        assert_eq!(
            validate_topic_filter("$share//a"),
            Err(TopicParseError::EmptySharedGroupName)
        );
        assert_eq!(
            validate_topic_filter("$share/g+/a"),
            Err(TopicParseError::InvalidSharedGroupName)
        );
        assert_eq!(
            validate_topic_filter("$share/group"),
            Err(TopicParseError::EmptyTopic)
        );
    }
}
