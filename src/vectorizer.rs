//! TF-IDF feature space: fitting a bounded vocabulary and embedding text.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::LazyLock,
};

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::VectorizerConfig,
    document::Document,
    error::BuildError,
    similarity::DocumentVector,
};

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w{2,}").expect("token pattern is valid"));

static STOP_WORDS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ENGLISH_STOP_WORDS.iter().copied().collect());

/// The fitted vocabulary and IDF weights of one generation.
///
/// Immutable once fit. Feature indices follow lexicographic term order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpace {
    vocabulary: BTreeMap<String, u32>,
    idf: Vec<f32>,
    ngram_max: usize,
}

impl FeatureSpace {
    /// Fit a feature space over a corpus of texts.
    pub fn fit(
        texts: &[&str],
        config: &VectorizerConfig,
    ) -> Result<Self, BuildError> {
        let ngram_max = config.ngram_max.max(1);
        let counts: Vec<HashMap<String, usize>> = texts
            .par_iter()
            .map(|text| count_terms(text, ngram_max))
            .collect();

        let n_docs = texts.len();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        for doc in &counts {
            for (term, &count) in doc {
                *doc_freq.entry(term).or_default() += 1;
                *term_freq.entry(term).or_default() += count;
            }
        }

        let max_doc_count = config.max_df * n_docs as f32;
        let mut kept: Vec<(&str, usize)> = doc_freq
            .iter()
            .filter(|&(_, &df)| df >= config.min_df)
            .filter(|&(_, &df)| n_docs < 2 || df as f32 <= max_doc_count)
            .map(|(&term, _)| (term, term_freq[term]))
            .collect();

        if kept.len() > config.max_features {
            kept.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
            kept.truncate(config.max_features);
        }
        if kept.is_empty() {
            return Err(BuildError::EmptyVocabulary);
        }

        let mut terms: Vec<&str> = kept.into_iter().map(|(t, _)| t).collect();
        terms.sort_unstable();

        let smoothed_docs = (n_docs + 1) as f32;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(terms.len());
        for (idx, term) in terms.into_iter().enumerate() {
            let df = doc_freq[term];
            idf.push((smoothed_docs / (df + 1) as f32).ln() + 1.0);
            vocabulary.insert(term.to_string(), idx as u32);
        }

        debug!(
            documents = n_docs,
            candidates = doc_freq.len(),
            features = vocabulary.len(),
            "fitted feature space"
        );
        Ok(Self {
            vocabulary,
            idf,
            ngram_max,
        })
    }

    /// Turn `text` into an L2-normalised TF-IDF vector over this space.
    ///
    /// Pure: the same text always yields the same vector. Text with no
    /// known terms yields the zero vector.
    pub fn embed(&self, text: &str) -> DocumentVector {
        let mut entries: Vec<(u32, f32)> = count_terms(text, self.ngram_max)
            .into_iter()
            .filter_map(|(term, count)| {
                let idx = *self.vocabulary.get(&term)?;
                Some((idx, count as f32 * self.idf[idx as usize]))
            })
            .collect();
        entries.sort_unstable_by_key(|e| e.0);

        let (indices, values) = entries.into_iter().unzip();
        let mut vector =
            DocumentVector::from_parts(self.dimension(), indices, values)
                .unwrap_or_else(|_| DocumentVector::zero(self.dimension()));
        vector.normalize();
        vector
    }

    pub fn len(&self) -> usize {
        self.idf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idf.is_empty()
    }

    pub fn dimension(&self) -> u32 {
        u32::try_from(self.idf.len()).unwrap_or(u32::MAX)
    }

    pub fn index_of(&self, term: &str) -> Option<u32> {
        self.vocabulary.get(term).copied()
    }

    pub fn idf(&self, term: &str) -> Option<f32> {
        self.index_of(term).map(|i| self.idf[i as usize])
    }

    /// Check that the vocabulary indexes exactly `0..len` in term order and
    /// that every weight is finite.
    pub fn check(&self) -> Result<(), String> {
        if self.vocabulary.len() != self.idf.len() {
            return Err(format!(
                "vocabulary has {} terms but {} weights",
                self.vocabulary.len(),
                self.idf.len()
            ));
        }
        for (expected, (term, &idx)) in self.vocabulary.iter().enumerate() {
            if idx as usize != expected {
                return Err(format!("term {term:?} has index {idx}"));
            }
        }
        if self.idf.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err("invalid idf weight".to_string());
        }
        Ok(())
    }
}

/// Fit a feature space over the raw text of `documents`.
pub fn fit(
    documents: &[Document],
    config: &VectorizerConfig,
) -> Result<FeatureSpace, BuildError> {
    let texts: Vec<&str> =
        documents.iter().map(|d| d.raw_text.as_str()).collect();
    FeatureSpace::fit(&texts, config)
}

/// Embed `text` in `space`.
pub fn embed(space: &FeatureSpace, text: &str) -> DocumentVector {
    space.embed(text)
}

/// Lowercased word tokens of two or more characters, stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|t| !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

fn count_terms(text: &str, ngram_max: usize) -> HashMap<String, usize> {
    let tokens = tokenize(text);
    let mut counts = HashMap::new();
    for n in 1..=ngram_max {
        for window in tokens.windows(n) {
            *counts.entry(window.join(" ")).or_default() += 1;
        }
    }
    counts
}

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again",
    "against", "all", "almost", "alone", "along", "already", "also",
    "although", "always", "am", "among", "amongst", "amoungst", "amount",
    "an", "and", "another", "any", "anyhow", "anyone", "anything", "anyway",
    "anywhere", "are", "around", "as", "at", "back", "be", "became",
    "because", "become", "becomes", "becoming", "been", "before",
    "beforehand", "behind", "being", "below", "beside", "besides",
    "between", "beyond", "bill", "both", "bottom", "but", "by", "call",
    "can", "cannot", "cant", "co", "con", "could", "couldnt", "cry", "de",
    "describe", "detail", "do", "done", "down", "due", "during", "each",
    "eg", "eight", "either", "eleven", "else", "elsewhere", "empty",
    "enough", "etc", "even", "ever", "every", "everyone", "everything",
    "everywhere", "except", "few", "fifteen", "fifty", "fill", "find",
    "fire", "first", "five", "for", "former", "formerly", "forty", "found",
    "four", "from", "front", "full", "further", "get", "give", "go", "had",
    "has", "hasnt", "have", "he", "hence", "her", "here", "hereafter",
    "hereby", "herein", "hereupon", "hers", "herself", "him", "himself",
    "his", "how", "however", "hundred", "i", "ie", "if", "in", "inc",
    "indeed", "interest", "into", "is", "it", "its", "itself", "keep",
    "last", "latter", "latterly", "least", "less", "ltd", "made", "many",
    "may", "me", "meanwhile", "might", "mill", "mine", "more", "moreover",
    "most", "mostly", "move", "much", "must", "my", "myself", "name",
    "namely", "neither", "never", "nevertheless", "next", "nine", "no",
    "nobody", "none", "noone", "nor", "not", "nothing", "now", "nowhere",
    "of", "off", "often", "on", "once", "one", "only", "onto", "or",
    "other", "others", "otherwise", "our", "ours", "ourselves", "out",
    "over", "own", "part", "per", "perhaps", "please", "put", "rather",
    "re", "same", "see", "seem", "seemed", "seeming", "seems", "serious",
    "several", "she", "should", "show", "side", "since", "sincere", "six",
    "sixty", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "system", "take", "ten",
    "than", "that", "the", "their", "them", "themselves", "then", "thence",
    "there", "thereafter", "thereby", "therefore", "therein", "thereupon",
    "these", "they", "thick", "thin", "third", "this", "those", "though",
    "three", "through", "throughout", "thru", "thus", "to", "together",
    "too", "top", "toward", "towards", "twelve", "twenty", "two", "un",
    "under", "until", "up", "upon", "us", "very", "via", "was", "we",
    "well", "were", "what", "whatever", "when", "whence", "whenever",
    "where", "whereafter", "whereas", "whereby", "wherein", "whereupon",
    "wherever", "whether", "which", "while", "whither", "who", "whoever",
    "whole", "whom", "whose", "why", "will", "with", "within", "without",
    "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];
