//! Terminal prompts

use std::io::{self, Write};

fn read_answer(question: &str) -> io::Result<String> {
    print!("{question} ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// `[y/N]` question
pub fn confirm(question: &str) -> anyhow::Result<bool> {
    let answer = read_answer(&format!("{question} [y/N]"))?;
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

/// Numbered choice; returns the 0-based index, or `None` on empty input
pub fn pick(question: &str, options: &[String]) -> anyhow::Result<Option<usize>> {
    println!("{question}");
    for (i, option) in options.iter().enumerate() {
        println!("  {}. {option}", i + 1);
    }
    loop {
        let answer = read_answer(&format!("Choose 1-{} (empty to cancel):", options.len()))?;
        if answer.is_empty() {
            return Ok(None);
        }
        match answer.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => return Ok(Some(n - 1)),
            _ => println!("Not a valid choice: {answer}"),
        }
    }
}

/// What to do with user-scope items the profile does not declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtrasChoice {
    Keep,
    Replace,
    Cancel,
}

pub fn extras(extras: &[String]) -> anyhow::Result<ExtrasChoice> {
    println!("User scope has {} item(s) not in this profile:", extras.len());
    for extra in extras {
        println!("  {extra}");
    }
    loop {
        let answer = read_answer("[k]eep them, [r]eplace (remove them) or [c]ancel?")?;
        match answer.to_lowercase().as_str() {
            "k" | "keep" => return Ok(ExtrasChoice::Keep),
            "r" | "replace" => return Ok(ExtrasChoice::Replace),
            "" | "c" | "cancel" => return Ok(ExtrasChoice::Cancel),
            _ => println!("Please answer k, r or c."),
        }
    }
}
