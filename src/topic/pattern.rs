use std::fmt;

/// One level of a subscription pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the topic level exactly
    Literal(String),
    /// `+`: matches exactly one level (captured)
    Single,
    /// `#`: matches the remaining levels, zero or more (last position only)
    Multi,
}

/// Pattern parsing errors
#[derive(Debug, Clone, PartialEq)]
pub enum TopicPatternError {
    /// Empty pattern
    Empty,
    /// `#` somewhere other than the last level
    MultiNotLast(String),
    /// Wildcard character mixed into a level, e.g. `temp+`
    InvalidWildcard(String),
}

impl fmt::Display for TopicPatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicPatternError::Empty => write!(f, "topic pattern is empty"),
            TopicPatternError::MultiNotLast(p) => {
                write!(f, "invalid pattern '{}': '#' must be the last level", p)
            }
            TopicPatternError::InvalidWildcard(p) => {
                write!(f, "invalid pattern '{}': wildcards must occupy a whole level", p)
            }
        }
    }
}

impl std::error::Error for TopicPatternError {}

/// Subscription pattern with `+` / `#` wildcard levels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    /// Parse a pattern such as `"m2ccm/+/+/temp"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use beacon::topic::TopicPattern;
    ///
    /// let pattern = TopicPattern::parse("m2ccm/+/+/temp").unwrap();
    /// assert_eq!(
    ///     pattern.captures("m2ccm/alice/dev1/temp"),
    ///     Some(vec!["alice", "dev1"])
    /// );
    /// assert!(!pattern.matches("m2ccm/alice/temp"));
    /// ```
    pub fn parse(pattern: &str) -> Result<Self, TopicPatternError> {
        if pattern.is_empty() {
            return Err(TopicPatternError::Empty);
        }

        let levels: Vec<&str> = super::levels(pattern).collect();
        let last = levels.len() - 1;
        let mut segments = Vec::with_capacity(levels.len());

        for (i, level) in levels.iter().enumerate() {
            let segment = match *level {
                "+" => Segment::Single,
                "#" if i == last => Segment::Multi,
                "#" => return Err(TopicPatternError::MultiNotLast(pattern.to_string())),
                other if other.contains('+') || other.contains('#') => {
                    return Err(TopicPatternError::InvalidWildcard(pattern.to_string()))
                }
                other => Segment::Literal(other.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// Match `topic` and return the levels captured by `+` segments, in order.
    pub fn captures<'t>(&self, topic: &'t str) -> Option<Vec<&'t str>> {
        let mut captured = Vec::new();
        let mut levels = super::levels(topic);

        for segment in &self.segments {
            match segment {
                Segment::Multi => return Some(captured),
                Segment::Single => captured.push(levels.next()?),
                Segment::Literal(expected) => {
                    if levels.next()? != expected {
                        return None;
                    }
                }
            }
        }

        // Pattern exhausted: topic must be exhausted too
        match levels.next() {
            None => Some(captured),
            Some(_) => None,
        }
    }

    pub fn matches(&self, topic: &str) -> bool {
        self.captures(topic).is_some()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
