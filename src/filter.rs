//! Keyword and category filtering of new articles.

use std::collections::HashSet;

use crate::article::ArticleRecord;

/// Inclusion and exclusion lists. Empty lists impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterRules {
    pub include_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub include_categories: Vec<String>,
    pub exclude_categories: Vec<String>,
}

impl FilterRules {
    pub fn is_empty(&self) -> bool {
        self.include_keywords.is_empty()
            && self.exclude_keywords.is_empty()
            && self.include_categories.is_empty()
            && self.exclude_categories.is_empty()
    }
}

/// Decides whether an article should be announced.
///
/// Exclusions are checked first and always win. When both include lists are set the
/// article must satisfy both; when only one is set only that one counts.
pub fn should_keep(article: &ArticleRecord, rules: &FilterRules) -> bool {
    let title = article.title.to_lowercase();
    let excerpt = article.excerpt.to_lowercase();

    if any_keyword_matches(&rules.exclude_keywords, &title, &excerpt) {
        return false;
    }

    let article_categories = normalize_categories(&article.categories);

    if !rules.exclude_categories.is_empty() {
        let excluded = normalize_categories(&rules.exclude_categories);
        if !excluded.is_disjoint(&article_categories) {
            return false;
        }
    }

    let keywords_set = !rules.include_keywords.is_empty();
    let categories_set = !rules.include_categories.is_empty();

    let match_keyword =
        !keywords_set || any_keyword_matches(&rules.include_keywords, &title, &excerpt);
    let match_category = !categories_set
        || !normalize_categories(&rules.include_categories).is_disjoint(&article_categories);

    match (keywords_set, categories_set) {
        (true, true) => match_keyword && match_category,
        (true, false) => match_keyword,
        (false, true) => match_category,
        (false, false) => true,
    }
}

// `title` and `excerpt` must already be lowercase.
fn any_keyword_matches(keywords: &[String], title: &str, excerpt: &str) -> bool {
    keywords.iter().any(|k| {
        let k = k.to_lowercase();
        title.contains(&k) || excerpt.contains(&k)
    })
}

fn normalize_categories(categories: &[String]) -> HashSet<String> {
    categories
        .iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect()
}
