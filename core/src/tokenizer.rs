use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"\w+").expect("valid regex");
    static ref ANALYZED_RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// How raw text is turned into index terms. The same policy must be used for
/// documents and queries, so it is fixed per engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tokenizer {
    /// Lowercase and split on whitespace. Punctuation stays attached: `"sat."` != `"sat"`.
    Whitespace,
    /// Lowercase and extract `\w+` runs. Punctuation is dropped.
    #[default]
    Word,
    /// NFKC normalization, lowercase, stopword removal and English stemming.
    Analyzed,
}

impl Tokenizer {
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        match self {
            Tokenizer::Whitespace => text.to_lowercase().split_whitespace().map(str::to_string).collect(),
            Tokenizer::Word => {
                let lowered = text.to_lowercase();
                WORD_RE.find_iter(&lowered).map(|m| m.as_str().to_string()).collect()
            }
            Tokenizer::Analyzed => analyze(text).into_iter().map(|(term, _)| term).collect(),
        }
    }
}

impl fmt::Display for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tokenizer::Whitespace => "whitespace",
            Tokenizer::Word => "word",
            Tokenizer::Analyzed => "analyzed",
        };
        f.write_str(name)
    }
}

impl FromStr for Tokenizer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "whitespace" | "ws" => Ok(Tokenizer::Whitespace),
            "word" | "regex" => Ok(Tokenizer::Word),
            "analyzed" | "stemmed" => Ok(Tokenizer::Analyzed),
            other => Err(format!("unknown tokenizer '{other}' (expected whitespace, word or analyzed)")),
        }
    }
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Analyze text into (term, position) pairs using NFKC normalization, lowercase, stopword removal, and stemming.
/// Positions count stopwords too, so gaps mark removed words.
pub fn analyze(text: &str) -> Vec<(String, usize)> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    let mut tokens = Vec::new();
    for (pos, mat) in ANALYZED_RE.find_iter(&normalized).enumerate() {
        let token = mat.as_str();
        if is_stopword(token) { continue; }
        let stem = STEMMER.stem(token).to_string();
        tokens.push((stem, pos));
    }
    tokens
}
