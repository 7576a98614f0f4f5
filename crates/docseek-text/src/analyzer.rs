use tantivy::tokenizer::{Language, LowerCaser, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer, TokenStream};

const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

/// Split on non-alphanumerics, lowercase, optionally drop stop words, then
/// apply the English Snowball stemmer so "tokens"/"token" and
/// "rotated"/"rotation" share a term.
pub fn build_analyzer(stop_words: bool) -> TextAnalyzer {
	let base = TextAnalyzer::builder(SimpleTokenizer::default()).filter(LowerCaser);
	if stop_words {
		base.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
			.filter(Stemmer::new(Language::English))
			.build()
	} else {
		base.filter(Stemmer::new(Language::English)).build()
	}
}

pub fn tokenize(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
	let mut stream = analyzer.token_stream(text);
	let mut terms = Vec::new();
	while stream.advance() {
		terms.push(stream.token().text.clone());
	}
	terms
}
