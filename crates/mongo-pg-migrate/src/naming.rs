//! Naming rules for destination tables and columns.
//!
//! Link tables and foreign-key columns are not stored in the schema catalog;
//! their names are derived from collection and attribute names with the
//! same case and inflection rules the destination schema was generated with.

use convert_case::{Case, Casing};
use inflector::string::pluralize::to_plural;
use inflector::string::singularize::to_singular;

/// Words with a single form for singular and plural.
const UNCOUNTABLE: &[&str] = &[
    "advice", "aircraft", "analytics", "audio", "bison", "cash", "chassis", "commerce",
    "corps", "deer", "equipment", "feedback", "firmware", "fish", "hardware",
    "headquarters", "health", "homework", "information", "jeans", "media", "moose",
    "music", "news", "personnel", "police", "research", "rice", "salmon", "series",
    "sheep", "software", "species", "staff", "traffic", "transportation", "wildlife",
];

/// `(singular, plural)` pairs the suffix rules get wrong.
const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("human", "humans"),
    ("child", "children"),
    ("foot", "feet"),
    ("tooth", "teeth"),
    ("goose", "geese"),
    ("mouse", "mice"),
    ("ox", "oxen"),
    ("die", "dice"),
    ("datum", "data"),
    ("criterion", "criteria"),
    ("phenomenon", "phenomena"),
    ("genus", "genera"),
    ("schema", "schemata"),
    ("thief", "thieves"),
    ("quiz", "quizzes"),
    ("proof", "proofs"),
    ("valve", "valves"),
    ("groove", "grooves"),
    ("passerby", "passersby"),
];

/// Look up the last `_`-separated segment of `word` in the irregular and
/// uncountable tables.
fn irregular(word: &str, to_plural_form: bool) -> Option<String> {
    let split = word.rfind('_').map(|i| i + 1).unwrap_or(0);
    let (prefix, last) = word.split_at(split);
    let last = last.to_lowercase();

    if UNCOUNTABLE.contains(&last.as_str()) {
        return Some(word.to_string());
    }
    IRREGULAR
        .iter()
        .find(|(one, many)| *one == last || *many == last)
        .map(|(one, many)| format!("{}{}", prefix, if to_plural_form { many } else { one }))
}

fn singular_word(word: &str) -> String {
    irregular(word, false).unwrap_or_else(|| to_singular(word))
}

fn plural_word(word: &str) -> String {
    irregular(word, true).unwrap_or_else(|| to_plural(word))
}

/// Split on every non-alphanumeric character so that `.`, `-`, `_` and
/// `::` all act as word boundaries before case conversion.
fn words(input: &str) -> String {
    input
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `magazine-article` → `magazine_article`, `seoMeta` → `seo_meta`.
pub fn snake_case(input: &str) -> String {
    words(input).to_case(Case::Snake)
}

/// `component_shared.seo` → `ComponentSharedSeo`.
pub fn pascal_case(input: &str) -> String {
    words(input).to_case(Case::Pascal)
}

/// Apply `inflect` to the trailing word of `input`, keeping everything up to
/// the last non-word character (`magazine-articles` inflects `articles`).
///
/// The inflection rules only return the matched word, so the prefix has to
/// be put back by hand.
fn inflect_last_word(input: &str, inflect: fn(&str) -> String) -> String {
    let split = input
        .rfind(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(|i| i + 1)
        .unwrap_or(0);
    let (prefix, word) = input.split_at(split);
    if word.is_empty() {
        return input.to_string();
    }
    format!("{}{}", prefix, inflect(word))
}

/// Singular form of a (possibly compound) name; only the last word inflects.
pub fn singular(input: &str) -> String {
    inflect_last_word(input, singular_word)
}

/// Plural form of a (possibly compound) name; only the last word inflects.
pub fn plural(input: &str) -> String {
    inflect_last_word(input, plural_word)
}

/// Foreign-key column pointing at rows of `table`: `{singular(table)}_id`.
pub fn fk_column(table: &str) -> String {
    format!("{}_id", singular(table))
}

/// Link table holding component and dynamic-zone links of `table`.
pub fn components_table(table: &str) -> String {
    format!("{}_components", table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("magazine-article"), "magazine_article");
        assert_eq!(snake_case("relatedArticles"), "related_articles");
        assert_eq!(snake_case("tags"), "tags");
        assert_eq!(snake_case("articles_tags"), "articles_tags");
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("component_shared.seo"), "ComponentSharedSeo");
        assert_eq!(pascal_case("users-permissions-user"), "UsersPermissionsUser");
    }

    #[test]
    fn test_inflection() {
        assert_eq!(singular("articles"), "article");
        assert_eq!(singular("categories"), "category");
        assert_eq!(plural("tag"), "tags");
        assert_eq!(plural("category"), "categories");
        assert_eq!(plural("articles"), "articles");
    }

    #[test]
    fn test_inflection_keeps_prefix() {
        assert_eq!(singular("magazine-articles"), "magazine-article");
        assert_eq!(singular("users-permissions_user"), "users-permissions_user");
        assert_eq!(plural("something-else-link"), "something-else-links");
    }

    #[test]
    fn test_irregular_and_uncountable_words() {
        assert_eq!(plural("person"), "people");
        assert_eq!(singular("people"), "person");
        assert_eq!(plural("people"), "people");
        assert_eq!(singular("data"), "datum");
        assert_eq!(plural("datum"), "data");
        assert_eq!(singular("media"), "media");
        assert_eq!(plural("media"), "media");
        assert_eq!(plural("child"), "children");
        assert_eq!(singular("sales_people"), "sales_person");
        assert_eq!(singular("magazine-children"), "magazine-child");
        assert_eq!(
            singular("components_custom_pages_components_recommended_readings"),
            "components_custom_pages_components_recommended_reading"
        );
    }

    #[test]
    fn test_fk_column() {
        assert_eq!(fk_column("articles"), "article_id");
        assert_eq!(fk_column("magazine-article"), "magazine-article_id");
        assert_eq!(fk_column("people"), "person_id");
        assert_eq!(fk_column("social_media"), "social_media_id");
    }

    #[test]
    fn test_components_table() {
        assert_eq!(components_table("pages"), "pages_components");
    }
}
