/// Where a candidate URL came from. Lower priority value beats higher when
/// two pages share a relevance rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSource {
    Sitemap,
    AiRanked,
    DefaultPattern,
}

impl PageSource {
    pub fn priority(&self) -> u8 {
        match self {
            PageSource::Sitemap => 0,
            PageSource::AiRanked => 1,
            PageSource::DefaultPattern => 2,
        }
    }
}

/// A URL hypothesized to contain company-profile-relevant content, not yet
/// fetched. Owned by a single pipeline invocation and discarded after the
/// content fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePage {
    pub url: String,
    pub relevance_rank: usize,
    pub source: PageSource,
}

pub fn sort_by_relevance(pages: &mut [CandidatePage]) {
    pages.sort_by_key(|p| (p.relevance_rank, p.source.priority()));
}
