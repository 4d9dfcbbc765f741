use crate::config::SplitMethod;

use super::{Document, DocumentError};

const RECURSIVE_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Character-count based text splitter.
///
/// `Character` splits on blank lines only. `Recursive` walks the separator
/// list and re-splits any piece that is still longer than `chunk_size`
/// with the next, finer separator; its separators stay attached to the
/// following piece. Both merge neighbouring pieces back into chunks of at
/// most `chunk_size` characters carrying up to `chunk_overlap` characters
/// over from the previous chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSplitter {
    method: SplitMethod,
    chunk_size: usize,
    chunk_overlap: usize,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl TextSplitter {
    pub fn new(method: SplitMethod, chunk_size: usize, chunk_overlap: usize) -> Result<Self, DocumentError> {
        if chunk_overlap > chunk_size {
            return Err(DocumentError::Overlap { chunk_size, overlap: chunk_overlap });
        }
        Ok(Self { method, chunk_size, chunk_overlap })
    }

    pub fn method(&self) -> SplitMethod {
        self.method
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        match self.method {
            SplitMethod::Character => {
                let pieces = split_on(text, "\n\n", false);
                self.merge_splits(&pieces, "\n\n")
            }
            SplitMethod::Recursive => self.split_recursive(text, &RECURSIVE_SEPARATORS),
        }
    }

    /// Splits every document, copying its metadata onto each chunk.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.page_content)
                    .into_iter()
                    .map(move |chunk| Document {
                        page_content: chunk,
                        metadata: doc.metadata.clone(),
                    })
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut good = Vec::new();
        for piece in split_on(text, separator, true) {
            if char_len(&piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge_splits(&good, ""));
                good.clear();
            }
            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, finer));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge_splits(&good, ""));
        }
        chunks
    }

    fn merge_splits(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joiner = |current: &Vec<&str>| if current.is_empty() { 0 } else { sep_len };

            if total + len + joiner(&current) > self.chunk_size {
                if total > self.chunk_size {
                    log::warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total, self.chunk_size
                    );
                }
                if !current.is_empty() {
                    if let Some(chunk) = join_pieces(&current, separator) {
                        chunks.push(chunk);
                    }
                    // Drop leading pieces until only the overlap remains
                    while total > self.chunk_overlap
                        || (total + len + joiner(&current) > self.chunk_size && total > 0)
                    {
                        let first = current.remove(0);
                        total -= char_len(first) + if current.is_empty() { 0 } else { sep_len };
                    }
                }
            }

            current.push(piece);
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }

        if let Some(chunk) = join_pieces(&current, separator) {
            chunks.push(chunk);
        }
        chunks
    }
}

fn join_pieces(pieces: &[&str], separator: &str) -> Option<String> {
    let joined = pieces.join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Splits on `separator`; with `keep` the separator starts the following piece.
fn split_on(text: &str, separator: &str, keep: bool) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut parts = text.split(separator);
    let mut pieces: Vec<String> = Vec::new();
    if let Some(first) = parts.next() {
        pieces.push(first.to_string());
    }
    for part in parts {
        if keep {
            pieces.push(format!("{}{}", separator, part));
        } else {
            pieces.push(part.to_string());
        }
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}
