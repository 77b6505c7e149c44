//! Text normalisation for card titles and descriptions.
//!
//! Catalog texts arrive as loosely formatted HTML. Before they are sent to
//! the marketplace they are stripped of markup, links and decorative
//! symbols, then shortened on word boundaries to the field limit.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

/// Maximum title length, in characters.
pub const TITLE_MAX_CHARS: usize = 60;

/// Maximum description length, in characters.
pub const DESCRIPTION_MAX_CHARS: usize = 2000;

const SPECIAL_CHARS: &[char] = &[
    '•', '@', '#', '$', '%', '^', '&', '*', '_', '[', ']', '{', '}', '|', ';', '\'', '"', '<', '>',
    '/', '®', '™', '▪',
];

static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?:?/?/?[^\s]+|(?:[a-zA-Z0-9-]+\.)+[a-zA-Z]{2,}").expect("valid link regex")
});

static PERIOD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(\S)").expect("valid period regex"));

static UNIMPORTANT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[%№(),."'|/\-+&]"#).expect("valid symbol regex"));

/// Words a shortened text must not end on.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // ru prepositions
        "в", "во", "на", "с", "со", "по", "о", "об", "обо", "за", "из", "изо", "к", "ко", "от",
        "ото", "до", "у", "перед", "передо", "для", "про", "над", "под", "при", "через",
        "между", "без", "вне", "около", "возле", "рядом", "близ", "после", "посредством",
        "вдоль", "вокруг", "посредине", "против", "из-за", "из-под", "наподобие", "взамен",
        "вместо", "среди", "сквозь", "благодаря", "несмотря", "вопреки",
        // ru conjunctions
        "и", "а", "но", "да", "либо", "или", "что", "чтобы", "как", "когда", "если", "хотя",
        "потому", "также", "тоже", "однако", "зато", "поскольку", "так", "будто", "словно",
        "только", "раз", "дабы", "иначе",
        // ru particles
        "бы", "ли", "же", "пусть", "ведь", "уж", "лишь", "даже", "вот", "вон", "разве",
        "точно", "неужели", "именно", "все-таки", "например",
        // en prepositions
        "at", "by", "for", "from", "in", "of", "on", "to", "with", "about", "against",
        "between", "into", "through", "during", "before", "after", "above", "below", "under",
        "over", "around", "among", "across", "behind", "beyond", "beside", "near", "outside",
        "inside", "without", "within", "along", "towards", "upon",
        // en conjunctions
        "and", "or", "but", "nor", "so", "although", "because", "since", "unless", "while",
        "whereas", "if", "then", "however", "whether", "either", "neither", "as", "though",
        "until", "once",
        // en particles
        "not", "no", "yes", "indeed", "only", "just", "almost", "also", "even", "still", "yet",
        "too", "perhaps", "maybe", "instead", "thus", "moreover", "therefore", "nonetheless",
        "meanwhile",
    ]
    .into_iter()
    .collect()
});

/// Clean `input` and shorten it to at most `max_chars` characters.
///
/// Length is counted in Unicode scalar values. The result never ends on a
/// preposition, conjunction or particle unless it is the only word left.
pub fn normalise(input: &str, max_chars: usize) -> String {
    let text = strip_markup(input);
    let text = remove_special_chars(&text);
    let text = LINK_RE.replace_all(&text, "");
    let text = PERIOD_RE.replace_all(&text, ". $1");
    let text = collapse_whitespace(&text);

    if char_len(&text) <= max_chars {
        return text;
    }

    let text = UNIMPORTANT_RE.replace_all(&text, "");
    reduce_to_length(&collapse_whitespace(&text), max_chars)
}

/// Drop HTML tags and decode entities.
fn strip_markup(input: &str) -> String {
    if !input.contains(['<', '&']) {
        return input.to_string();
    }
    Html::parse_fragment(input).root_element().text().collect()
}

fn remove_special_chars(input: &str) -> String {
    input.chars().filter(|c| !SPECIAL_CHARS.contains(c)).collect()
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word.to_lowercase().as_str())
}

/// Keep whole words while they fit, then trim trailing stop words.
fn reduce_to_length(input: &str, max_chars: usize) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut total = 0;

    for word in input.split(' ') {
        let needed = char_len(word) + usize::from(!kept.is_empty());
        if total + needed > max_chars {
            break;
        }
        total += needed;
        kept.push(word);
    }

    if kept.is_empty() {
        return input.chars().take(max_chars).collect();
    }

    while kept.len() > 1 && kept.last().is_some_and(|w| is_stop_word(w)) {
        kept.pop();
    }

    kept.join(" ")
}
