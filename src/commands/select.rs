/// A parsed line of menu input.
#[derive(Debug, PartialEq, Eq)]
pub enum Choice {
    Quit,
    /// Zero-based index into the races still on offer.
    Race(usize),
    Invalid(String),
}

pub fn parse_choice(input: &str, count: usize) -> Choice {
    let input = input.trim();
    if input.eq_ignore_ascii_case("q") || input.eq_ignore_ascii_case("quit") {
        return Choice::Quit;
    }
    match input.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Choice::Race(n - 1),
        Ok(_) => Choice::Invalid(format!("Please enter a number between 1 and {}.", count)),
        Err(_) => Choice::Invalid("Invalid input. Please enter a number or 'q' to quit.".to_string()),
    }
}
