//! Classifier properties: determinism, category routing, and the
//! casual boost for simple informational questions.

use modelmux::classify::{analyze_prompt, estimate_tokens};
use modelmux::TaskCategory;

#[test]
fn identical_input_identical_output() {
    let prompts = [
        "Write a function to check if a number is prime",
        "what is the weather like",
        "calculate 15 * 96",
        "write a short story about a lighthouse keeper",
        "summarize this csv file",
    ];
    for prompt in prompts {
        let first = analyze_prompt(prompt);
        for _ in 0..5 {
            let again = analyze_prompt(prompt);
            assert_eq!(again.category, first.category, "category drifted for {prompt:?}");
            assert_eq!(
                again.confidence, first.confidence,
                "confidence drifted for {prompt:?}"
            );
            assert_eq!(again.estimated_input_tokens, first.estimated_input_tokens);
        }
    }
}

#[test]
fn prime_function_scenario() {
    let analysis = analyze_prompt("Write a function to check if a number is prime");
    assert_eq!(analysis.category, TaskCategory::Coding);
    assert!(analysis.confidence > 0.4);
}

#[test]
fn category_routing_across_the_board() {
    let cases = [
        ("debug this python error for me", TaskCategory::Coding),
        ("write a poem about the ocean at dusk", TaskCategory::Creative),
        ("solve the equation 3 + 4 * 12", TaskCategory::Math),
        ("how should I plan my weekend", TaskCategory::Casual),
        (
            "analyze this dataset and extract the main trend",
            TaskCategory::DataAnalysis,
        ),
    ];
    for (prompt, expected) in cases {
        let analysis = analyze_prompt(prompt);
        assert_eq!(analysis.category, expected, "misrouted: {prompt:?}");
    }
}

#[test]
fn simple_questions_stay_casual() {
    // Trivial lookups should not land on code-oriented models even
    // when they mention technical nouns.
    for prompt in ["What is an API?", "Who is Ada Lovelace?", "What is SQL?"] {
        let analysis = analyze_prompt(prompt);
        assert_eq!(analysis.category, TaskCategory::Casual, "misrouted: {prompt:?}");
    }
}

#[test]
fn creation_requests_escape_the_casual_boost() {
    let analysis = analyze_prompt("What is the code to implement a stack in python?");
    assert_eq!(analysis.category, TaskCategory::Coding);
}

#[test]
fn no_signal_defaults_to_casual_with_half_confidence() {
    let analysis = analyze_prompt("qwerty zxcvb asdfgh");
    assert_eq!(analysis.category, TaskCategory::Casual);
    assert_eq!(analysis.confidence, 0.5);
}

#[test]
fn token_estimate_is_four_chars_per_token() {
    assert_eq!(estimate_tokens("12345678"), 2);
    assert_eq!(estimate_tokens("123456789"), 3);
    let analysis = analyze_prompt("a".repeat(400).as_str());
    assert_eq!(analysis.estimated_input_tokens, 100);
}
