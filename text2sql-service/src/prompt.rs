//! 提示词构建
//!
//! Builds the instruction sent to the model: a role line, the schema of the
//! single `STUDENT` table, three question/answer examples, the output rule and
//! finally the user's question.
//!
//! The question is interpolated as-is. Nothing in it is escaped, so a question
//! can steer the model; the executor's statement policy is the place to limit
//! what the resulting SQL may do.

/// Role given to the model.
const SYSTEM_INSTRUCTION: &str = "You are an expert SQL translator.";

/// Schema description of the target database.
const SCHEMA_HINT: &str = "The PostgreSQL database contains a table STUDENT with columns:\n\
                           NAME, COURSE, SECTION, MARKS.";

const OUTPUT_RULE: &str = "Only return the SQL query, without explanation or markdown formatting.";

/// Question/answer pairs showing the expected output shape.
pub const FEW_SHOT_EXAMPLES: [(&str, &str); 3] = [
    (
        "How many students are in total?",
        "SELECT COUNT(*) FROM STUDENT;",
    ),
    (
        "Show all students studying Data Science.",
        "SELECT * FROM STUDENT WHERE COURSE = 'Data Science';",
    ),
    (
        "Show students with marks above 90.",
        "SELECT * FROM STUDENT WHERE MARKS > 90;",
    ),
];

/// Formats the full prompt for `question`.
pub fn build_prompt(question: &str) -> String {
    let examples: String = FEW_SHOT_EXAMPLES
        .iter()
        .map(|(q, a)| format!("Q: {}\nA: {}\n\n", q, a))
        .collect();

    format!(
        "{}\n{}\n\nExamples:\n{}{}\nQuestion: {}",
        SYSTEM_INSTRUCTION, SCHEMA_HINT, examples, OUTPUT_RULE, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_question_verbatim() {
        let question = "Which students in section 'B' scored > 80? {ignore} \"quotes\"\n";
        let prompt = build_prompt(question);
        assert!(prompt.contains(question));
        assert!(prompt.ends_with(&format!("Question: {}", question)));
    }

    #[test]
    fn test_prompt_contains_schema_and_examples() {
        let prompt = build_prompt("How many courses are there?");
        assert!(prompt.starts_with("You are an expert SQL translator."));
        assert!(prompt.contains("table STUDENT with columns:\nNAME, COURSE, SECTION, MARKS."));
        for (q, a) in FEW_SHOT_EXAMPLES {
            assert!(prompt.contains(&format!("Q: {}\nA: {}", q, a)));
        }
        assert!(prompt.contains(OUTPUT_RULE));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        assert_eq!(build_prompt("Show all students"), build_prompt("Show all students"));
        assert_ne!(build_prompt("a"), build_prompt("b"));
    }

    #[test]
    fn test_empty_question() {
        let prompt = build_prompt("");
        assert!(prompt.ends_with("Question: "));
    }
}
