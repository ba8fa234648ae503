//! Text normalization and tokenization
//!
//! Everything downstream works on folded text: lowercase, diacritics
//! removed, whitespace collapsed. Identifiers from the schema go through
//! [`split_ident`] so `FechaRegistro`, `fecha_registro` and `fecharegistro2`
//! yield comparable tokens.

/// Lowercase, strip diacritics and collapse whitespace
pub fn normalize(text: &str) -> String {
    let folded = fold_diacritics(&text.to_lowercase());
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace accented Latin letters with their base letter
///
/// Also drops the inverted punctuation marks used in Spanish questions.
pub fn fold_diacritics(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '¿' | '¡'))
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' | 'ã' | 'å' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            'Á' | 'À' | 'Ä' | 'Â' | 'Ã' | 'Å' => 'A',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'O',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'Ñ' => 'N',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

/// Split normalized text into word tokens (`[a-z0-9_]+`)
pub fn tokenize(normalized: &str) -> Vec<String> {
    normalized
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Break a schema identifier into lowercase word tokens
///
/// Splits on underscores, camelCase boundaries and letter/digit
/// boundaries; digit-only pieces are dropped.
pub fn split_ident(ident: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in fold_diacritics(ident).chars() {
        if !c.is_ascii_alphanumeric() {
            flush(&mut current, &mut tokens);
            prev = None;
            continue;
        }

        if let Some(p) = prev {
            let camel = p.is_ascii_lowercase() && c.is_ascii_uppercase();
            let digit_edge = p.is_ascii_digit() != c.is_ascii_digit();
            if camel || digit_edge {
                flush(&mut current, &mut tokens);
            }
        }

        current.push(c.to_ascii_lowercase());
        prev = Some(c);
    }
    flush(&mut current, &mut tokens);

    tokens
}

fn flush(current: &mut String, tokens: &mut Vec<String>) {
    if !current.is_empty() {
        if !current.chars().all(|c| c.is_ascii_digit()) {
            tokens.push(std::mem::take(current));
        } else {
            current.clear();
        }
    }
}

/// Whether two folded words match exactly or as singular/plural forms
pub fn same_word(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    match long.strip_prefix(short) {
        Some("s") | Some("es") => short.len() > 2,
        _ => false,
    }
}

const STOPWORDS_ES: &[&str] = &[
    "a", "al", "como", "con", "cual", "cuales", "cuanta", "cuanto", "de", "del", "donde", "e",
    "el", "ella", "en", "entre", "es", "esta", "estan", "estas", "este", "esto", "estos", "fue",
    "fueron", "ha", "han", "hay", "la", "las", "le", "lo", "los", "mas", "me", "mi", "mis", "muy",
    "no", "o", "para", "pero", "por", "que", "quien", "se", "ser", "si", "sin", "sobre", "son",
    "su", "sus", "tiene", "tienen", "todo", "todos", "todas", "tu", "u", "un", "una", "unas",
    "unos", "y", "ya",
];

const STOPWORDS_EN: &[&str] = &[
    "a", "all", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "has",
    "have", "in", "is", "it", "me", "my", "of", "on", "or", "our", "show", "the", "there", "this",
    "to", "was", "were", "what", "which", "who", "with",
];

/// Spanish or English function word
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS_ES.contains(&token) || STOPWORDS_EN.contains(&token)
}
