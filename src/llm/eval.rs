use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use crate::config::EvalSettings;
use crate::document::Document;
use crate::llm::qa::RetrievalQA;
use crate::providers::ChatModel;

pub const QA_GENERATION_PROMPT: &str = "You are a teacher coming up with questions to ask on a quiz. 
Given the following document, please generate a question and answer based on the document.

Example Format:
<Begin Document>
...
<End Document>
QUESTION: question here
ANSWER: answer here

These questions should be detailed and be based explicitly on information in the document. Begin!

<Begin Document>
{doc}
<End Document>";

pub const GRADING_PROMPT: &str = "You are a teacher grading a quiz.
You are given a question, the student's answer, and the true answer, and are asked to score the student answer as either CORRECT or INCORRECT.

Example Format:
QUESTION: question here
STUDENT ANSWER: student's answer here
TRUE ANSWER: true answer here
GRADE: CORRECT or INCORRECT here

Grade the student answers based ONLY on their factual accuracy. Ignore differences in punctuation and phrasing between the student answer and true answer. It is OK if the student answer contains more information than the true answer, as long as it does not contain any conflicting statements. Begin! 

QUESTION: {query}
STUDENT ANSWER: {result}
TRUE ANSWER: {answer}
GRADE:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Grade {
    Correct,
    Incorrect,
}

impl Grade {
    /// Reads a grader reply; anything not clearly correct counts as incorrect.
    pub fn from_reply(reply: &str) -> Self {
        let upper = reply.to_uppercase();
        if upper.contains("INCORRECT") {
            Grade::Incorrect
        } else if upper.contains("CORRECT") {
            Grade::Correct
        } else {
            Grade::Incorrect
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Correct => f.write_str("CORRECT"),
            Grade::Incorrect => f.write_str("INCORRECT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub question: String,
    pub expected: String,
    pub answer: String,
    pub grade: Grade,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub document: String,
    pub settings: EvalSettings,
    pub created_at: DateTime<Utc>,
    pub results: Vec<EvalResult>,
}

impl EvalReport {
    pub fn correct(&self) -> usize {
        self.results.iter().filter(|r| r.grade == Grade::Correct).count()
    }

    pub fn score(&self) -> f32 {
        if self.results.is_empty() {
            0.0
        } else {
            self.correct() as f32 / self.results.len() as f32
        }
    }

    /// Writes question, expected, answer and grade columns.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for result in &self.results {
            csv_writer.serialize(result)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

/// Pulls `QUESTION:` and `ANSWER:` out of a generation reply.
pub fn parse_qa_pair(reply: &str) -> Option<QaPair> {
    let after_question = &reply[reply.find("QUESTION:")? + "QUESTION:".len()..];
    let answer_at = after_question.find("ANSWER:")?;

    let question = after_question[..answer_at].trim();
    let answer = after_question[answer_at + "ANSWER:".len()..].trim();
    if question.is_empty() || answer.is_empty() {
        return None;
    }

    Some(QaPair {
        question: question.to_string(),
        answer: answer.to_string(),
    })
}

/// Generates quiz questions from document chunks and grades chain answers.
pub struct Evaluator {
    llm: Arc<dyn ChatModel>,
}

impl Evaluator {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    /// One question per randomly chosen chunk; unparseable replies are skipped.
    pub async fn generate<R: Rng + ?Sized>(&self, chunks: &[Document], count: usize, rng: &mut R) -> Result<Vec<QaPair>> {
        let picked: Vec<&Document> = chunks.choose_multiple(rng, count).collect();

        let mut pairs = Vec::with_capacity(picked.len());
        for chunk in picked {
            let prompt = QA_GENERATION_PROMPT.replace("{doc}", &chunk.page_content);
            let reply = self.llm.complete(&prompt).await?;
            match parse_qa_pair(&reply) {
                Some(pair) => pairs.push(pair),
                None => log::warn!("Could not parse generated question from reply: {}", reply),
            }
        }
        Ok(pairs)
    }

    pub async fn grade(&self, question: &str, student_answer: &str, true_answer: &str) -> Result<Grade> {
        let prompt = GRADING_PROMPT
            .replace("{query}", question)
            .replace("{result}", student_answer)
            .replace("{answer}", true_answer);
        let reply = self.llm.complete(&prompt).await?;
        Ok(Grade::from_reply(&reply))
    }

    /// Answers every pair through the chain and grades it.
    pub async fn evaluate(
        &self,
        chain: &RetrievalQA,
        pairs: &[QaPair],
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<Vec<EvalResult>> {
        let mut results = Vec::with_capacity(pairs.len());
        for (i, pair) in pairs.iter().enumerate() {
            let answer = chain.run(&pair.question).await?.answer;
            let grade = self.grade(&pair.question, &answer, &pair.answer).await?;
            log::info!("Question {}/{} graded {}", i + 1, pairs.len(), grade);

            results.push(EvalResult {
                question: pair.question.clone(),
                expected: pair.answer.clone(),
                answer,
                grade,
            });
            on_progress(i + 1, pairs.len());
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::ScriptedChat;
    use crate::retrieval::TfidfRetriever;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_qa_pair() {
        let reply = "QUESTION: How long is the warranty?\n\nANSWER: Two years.";
        assert_eq!(
            parse_qa_pair(reply),
            Some(QaPair {
                question: "How long is the warranty?".to_string(),
                answer: "Two years.".to_string(),
            })
        );
        assert_eq!(parse_qa_pair("ANSWER: only an answer"), None);
        assert_eq!(parse_qa_pair("QUESTION: ?\nANSWER:   "), None);
    }

    #[test]
    fn test_grade_from_reply() {
        assert_eq!(Grade::from_reply(" CORRECT"), Grade::Correct);
        assert_eq!(Grade::from_reply("GRADE: incorrect"), Grade::Incorrect);
        assert_eq!(Grade::from_reply("unsure"), Grade::Incorrect);
    }

    #[tokio::test]
    async fn test_generate_skips_unparseable_replies() {
        let llm = Arc::new(ScriptedChat::new(
            &["QUESTION: What is due?\nANSWER: Invoices", "no idea"],
            "",
        ));
        let chunks = vec![Document::new("first chunk"), Document::new("second chunk")];
        let mut rng = StdRng::seed_from_u64(7);

        let pairs = Evaluator::new(llm.clone()).generate(&chunks, 5, &mut rng).await.unwrap();
        assert_eq!(pairs.len(), 1);
        // Only as many prompts as there are chunks
        assert_eq!(llm.prompts().len(), 2);
        assert!(llm.prompts()[0].contains("<Begin Document>"));
    }

    #[tokio::test]
    async fn test_evaluate_grades_chain_answers() {
        let chain_llm = Arc::new(ScriptedChat::new(&["Two years"], ""));
        let retriever = TfidfRetriever::from_documents(&[Document::new("warranty two years")], 1);
        let chain = RetrievalQA::from_chain_type(chain_llm, Arc::new(retriever));

        let grader = Arc::new(ScriptedChat::new(&["CORRECT"], ""));
        let pairs = vec![QaPair {
            question: "How long is the warranty?".to_string(),
            answer: "2 years".to_string(),
        }];

        let mut seen = Vec::new();
        let results = Evaluator::new(grader.clone())
            .evaluate(&chain, &pairs, |done, total| seen.push((done, total)))
            .await
            .unwrap();

        assert_eq!(results[0].answer, "Two years");
        assert_eq!(results[0].grade, Grade::Correct);
        assert_eq!(seen, vec![(1, 1)]);
        assert!(grader.prompts()[0].contains("STUDENT ANSWER: Two years"));
    }

    #[test]
    fn test_report_score_and_csv() {
        let report = EvalReport {
            document: "a.pdf".to_string(),
            settings: EvalSettings::default(),
            created_at: Utc::now(),
            results: vec![
                EvalResult {
                    question: "q1".to_string(),
                    expected: "e1".to_string(),
                    answer: "a1".to_string(),
                    grade: Grade::Correct,
                },
                EvalResult {
                    question: "q2".to_string(),
                    expected: "e2".to_string(),
                    answer: "a, with comma".to_string(),
                    grade: Grade::Incorrect,
                },
            ],
        };
        assert_eq!(report.score(), 0.5);

        let mut out = Vec::new();
        report.write_csv(&mut out).unwrap();
        let csv = String::from_utf8(out).unwrap();
        assert_eq!(
            csv,
            "question,expected,answer,grade\nq1,e1,a1,CORRECT\nq2,e2,\"a, with comma\",INCORRECT\n"
        );
    }
}
