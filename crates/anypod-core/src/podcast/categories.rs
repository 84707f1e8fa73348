//! Apple Podcasts category handling
//!
//! Validates and canonicalizes categories against Apple's closed hierarchy.
//! See <https://podcasters.apple.com/support/1691-apple-podcasts-categories>.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::CoreError;

/// Apple's exact supported category and subcategory names.
const HIERARCHY: &[(&str, &[&str])] = &[
    (
        "Arts",
        &[
            "Books",
            "Design",
            "Fashion & Beauty",
            "Food",
            "Performing Arts",
            "Visual Arts",
        ],
    ),
    (
        "Business",
        &[
            "Careers",
            "Entrepreneurship",
            "Investing",
            "Management",
            "Marketing",
            "Non-Profit",
        ],
    ),
    ("Comedy", &["Comedy Interviews", "Improv", "Stand-Up"]),
    (
        "Education",
        &["Courses", "How To", "Language Learning", "Self-Improvement"],
    ),
    ("Fiction", &["Comedy Fiction", "Drama", "Science Fiction"]),
    ("Government", &[]),
    ("History", &[]),
    (
        "Health & Fitness",
        &[
            "Alternative Health",
            "Fitness",
            "Medicine",
            "Mental Health",
            "Nutrition",
            "Sexuality",
        ],
    ),
    (
        "Kids & Family",
        &[
            "Education for Kids",
            "Parenting",
            "Pets & Animals",
            "Stories for Kids",
        ],
    ),
    (
        "Leisure",
        &[
            "Animation & Manga",
            "Automotive",
            "Aviation",
            "Crafts",
            "Games",
            "Hobbies",
            "Home & Garden",
            "Video Games",
        ],
    ),
    (
        "Music",
        &["Music Commentary", "Music History", "Music Interviews"],
    ),
    (
        "News",
        &[
            "Business News",
            "Daily News",
            "Entertainment News",
            "News Commentary",
            "Politics",
            "Sports News",
            "Tech News",
        ],
    ),
    (
        "Religion & Spirituality",
        &[
            "Buddhism",
            "Christianity",
            "Hinduism",
            "Islam",
            "Judaism",
            "Religion",
            "Spirituality",
        ],
    ),
    (
        "Science",
        &[
            "Astronomy",
            "Chemistry",
            "Earth Sciences",
            "Life Sciences",
            "Mathematics",
            "Natural Sciences",
            "Nature",
            "Physics",
            "Social Sciences",
        ],
    ),
    (
        "Society & Culture",
        &[
            "Documentary",
            "Personal Journals",
            "Philosophy",
            "Places & Travel",
            "Relationships",
        ],
    ),
    (
        "Sports",
        &[
            "Baseball",
            "Basketball",
            "Cricket",
            "Fantasy Sports",
            "Football",
            "Golf",
            "Hockey",
            "Rugby",
            "Running",
            "Soccer",
            "Swimming",
            "Tennis",
            "Volleyball",
            "Wilderness",
            "Wrestling",
        ],
    ),
    ("Technology", &[]),
    ("True Crime", &[]),
    (
        "TV & Film",
        &[
            "After Shows",
            "Film History",
            "Film Interviews",
            "Film Reviews",
            "TV Reviews",
        ],
    ),
];

/// Unescape HTML entities, collapse whitespace, and lowercase.
fn normalize(name: &str) -> String {
    let unescaped = html_escape::decode_html_entities(name);
    unescaped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn canonical_main(name: &str) -> Option<&'static str> {
    let key = normalize(name);
    HIERARCHY
        .iter()
        .find(|(main, _)| normalize(main) == key)
        .map(|(main, _)| *main)
}

fn canonical_sub(name: &str) -> Option<&'static str> {
    let key = normalize(name);
    HIERARCHY
        .iter()
        .flat_map(|(_, subs)| subs.iter())
        .find(|sub| normalize(sub) == key)
        .copied()
}

/// One or two validated Apple Podcasts categories, each with at most one
/// subcategory. Canonical names only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodcastCategories {
    categories: BTreeSet<(String, Option<String>)>,
}

impl PodcastCategories {
    /// Parse a single category string, either `"Main"` or `"Main > Sub"`.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidCategory` when either part is not a valid
    /// Apple Podcasts name.
    fn parse_single(category: &str) -> Result<(String, Option<String>), CoreError> {
        let (main, sub) = match category.split_once('>') {
            Some((main, sub)) => (main.trim(), Some(sub.trim())),
            None => (category.trim(), None),
        };
        Self::validate_pair(main, sub)
    }

    fn validate_pair(
        main: &str,
        sub: Option<&str>,
    ) -> Result<(String, Option<String>), CoreError> {
        let invalid = || CoreError::InvalidCategory(format!("{main:?}, {sub:?}"));
        let main_canonical = canonical_main(main).ok_or_else(invalid)?;
        let sub_canonical = match sub {
            None => None,
            Some(s) => Some(canonical_sub(s).ok_or_else(invalid)?),
        };
        Ok((
            main_canonical.to_string(),
            sub_canonical.map(ToString::to_string),
        ))
    }

    /// Parse from a string: `"Main"`, `"Main > Sub"`, or a comma-separated
    /// pair of those.
    ///
    /// # Errors
    /// Returns `CoreError` on unknown names, more than 2 categories, or an
    /// empty input.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        if value.trim().is_empty() {
            return Err(CoreError::EmptyCategories);
        }
        let parts: Vec<&str> = value.split(',').collect();
        if parts.len() > 2 {
            return Err(CoreError::TooManyCategories(parts.len()));
        }
        let mut categories = BTreeSet::new();
        for part in parts {
            categories.insert(Self::parse_single(part)?);
        }
        Ok(Self { categories })
    }

    /// Build from explicit `(main, sub)` pairs.
    ///
    /// # Errors
    /// Returns `CoreError` on unknown names, more than 2 categories, or an
    /// empty list.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let mut categories = BTreeSet::new();
        for (main, sub) in pairs {
            categories.insert(Self::validate_pair(main, sub)?);
        }
        match categories.len() {
            0 => Err(CoreError::EmptyCategories),
            1 | 2 => Ok(Self { categories }),
            n => Err(CoreError::TooManyCategories(n)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// `(main, sub)` pairs in canonical sort order, as used for
    /// `itunes:category` output.
    #[must_use]
    pub fn itunes_list(&self) -> Vec<(String, Option<String>)> {
        self.categories.iter().cloned().collect()
    }

    /// Main category names in canonical sort order, as used for the plain
    /// RSS `<category>` elements.
    #[must_use]
    pub fn rss_terms(&self) -> Vec<String> {
        self.categories.iter().map(|(main, _)| main.clone()).collect()
    }
}

impl Default for PodcastCategories {
    #[expect(clippy::expect_used)]
    fn default() -> Self {
        Self::parse("TV & Film").expect("default category is valid")
    }
}

impl fmt::Display for PodcastCategories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .categories
            .iter()
            .map(|(main, sub)| match sub {
                Some(sub) => format!("{main} > {sub}"),
                None => main.clone(),
            })
            .collect();
        f.write_str(&rendered.join(", "))
    }
}

impl TryFrom<String> for PodcastCategories {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl Serialize for PodcastCategories {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PodcastCategories {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawItem {
            Str(String),
            Pair { main: String, sub: Option<String> },
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            List(Vec<RawItem>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Str(s) => Self::parse(&s).map_err(serde::de::Error::custom),
            Raw::List(items) => {
                if items.len() > 2 {
                    return Err(serde::de::Error::custom(CoreError::TooManyCategories(
                        items.len(),
                    )));
                }
                let mut categories = BTreeSet::new();
                for item in items {
                    let pair = match item {
                        RawItem::Str(s) => Self::parse_single(&s),
                        RawItem::Pair { main, sub } => {
                            Self::validate_pair(&main, sub.as_deref())
                        }
                    }
                    .map_err(serde::de::Error::custom)?;
                    categories.insert(pair);
                }
                if categories.is_empty() {
                    return Err(serde::de::Error::custom(CoreError::EmptyCategories));
                }
                Ok(Self { categories })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("TV & Film", "TV & Film"; "exact main")]
    #[test_case("tv & film", "TV & Film"; "case insensitive")]
    #[test_case("TV &amp; Film", "TV & Film"; "html entity")]
    #[test_case("News > Tech News", "News > Tech News"; "main and sub")]
    #[test_case("news>tech news", "News > Tech News"; "no spaces around sep")]
    #[test_case("Comedy, History", "Comedy, History"; "two mains")]
    fn parses_and_canonicalizes(input: &str, expected: &str) {
        let cats = PodcastCategories::parse(input).unwrap();
        assert_eq!(cats.to_string(), expected);
    }

    #[test]
    fn rejects_unknown_main() {
        assert!(PodcastCategories::parse("Podcasting").is_err());
    }

    #[test]
    fn rejects_more_than_two() {
        assert!(matches!(
            PodcastCategories::parse("Arts, Comedy, History"),
            Err(CoreError::TooManyCategories(3))
        ));
    }

    #[test]
    fn rejects_unknown_sub() {
        assert!(PodcastCategories::parse("News > Nonsense").is_err());
    }

    #[test]
    fn deserializes_list_of_maps() {
        let yaml = "- main: News\n  sub: Politics\n- main: History\n";
        let cats: PodcastCategories = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cats.to_string(), "History, News > Politics");
    }

    #[test]
    fn itunes_list_is_sorted_pairs() {
        let cats = PodcastCategories::parse("News > Politics, Arts").unwrap();
        assert_eq!(
            cats.itunes_list(),
            vec![
                ("Arts".to_string(), None),
                ("News".to_string(), Some("Politics".to_string())),
            ]
        );
        assert_eq!(cats.rss_terms(), vec!["Arts", "News"]);
    }

    #[test]
    fn round_trips_through_db_string() {
        let cats = PodcastCategories::parse("News > Politics, Arts").unwrap();
        let stored = cats.to_string();
        let restored = PodcastCategories::try_from(stored).unwrap();
        assert_eq!(cats, restored);
    }
}
