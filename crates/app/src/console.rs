//! Line-oriented front end for a running simulation.

use std::fmt::Write as _;

use exam_core::model::{AnswerOutcome, SessionState, SessionStatus};
use services::{FinishedSimulation, RunningSimulation, SimulationError, SimulationLoopService};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Show,
    Answer(usize),
    Flag,
    Next,
    Previous,
    Goto(usize),
    Reveal,
    Submit,
    Quit,
    Help,
}

impl Input {
    /// Parse one typed line. Numbers shown to the user are 1-based.
    fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let Some(word) = parts.next() else {
            return Ok(Self::Show);
        };
        let arg = parts.next();
        let index = |raw: Option<&str>| -> Result<usize, String> {
            let raw = raw.ok_or_else(|| format!("`{word}` needs a number"))?;
            match raw.parse::<usize>() {
                Ok(n) if n >= 1 => Ok(n - 1),
                _ => Err(format!("not a choice number: {raw}")),
            }
        };

        match word {
            "s" | "show" => Ok(Self::Show),
            "a" | "answer" => index(arg).map(Self::Answer),
            "f" | "flag" => Ok(Self::Flag),
            "n" | "next" => Ok(Self::Next),
            "p" | "prev" | "previous" => Ok(Self::Previous),
            "g" | "goto" => index(arg).map(Self::Goto),
            "r" | "reveal" => Ok(Self::Reveal),
            "submit" => Ok(Self::Submit),
            "q" | "quit" => Ok(Self::Quit),
            "h" | "help" | "?" => Ok(Self::Help),
            digits if digits.chars().all(|c| c.is_ascii_digit()) => {
                index(Some(digits)).map(Self::Answer)
            }
            other => Err(format!("unknown command: {other} (type `help`)")),
        }
    }
}

const HELP: &str = "\
  <n> | a <n>   choose option n for the current question
  n / p         next / previous question
  g <n>         go to question n
  f             toggle flag on the current question
  r             reveal the answer (practice only)
  s             show the current question again
  submit        finish and score
  q             leave; the session is checkpointed and can be resumed";

/// Run the interactive loop until the session ends or the user leaves.
pub async fn drive(
    svc: &SimulationLoopService,
    running: RunningSimulation,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = running.session().clone();
    let mut status = session.status_watch();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("session {} ({})", session.id(), session.read(|s| s.mode())?);
    println!("{}", session.read(render)?);

    let submit = loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() || *status.borrow_and_update() != SessionStatus::Active {
                    println!("\ntime is up.");
                    break true;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break false;
                };
                let input = match Input::parse(&line) {
                    Ok(input) => input,
                    Err(msg) => {
                        println!("{msg}");
                        continue;
                    }
                };
                if session.is_terminal()? {
                    break true;
                }
                match apply(&running, input) {
                    Ok(Step::Continue) => {}
                    Ok(Step::Submit) => break true,
                    Ok(Step::Leave) => break false,
                    Err(SimulationError::Session(err)) => println!("! {err}"),
                    Err(err) => return Err(err.into()),
                }
            }
        }
    };

    if submit {
        let finished = svc.finish(running).await?;
        print!("{}", render_result(&finished));
    } else {
        svc.flush_checkpoints().await;
        println!("saved. resume with: run --resume {}", session.id());
    }
    Ok(())
}

enum Step {
    Continue,
    Submit,
    Leave,
}

fn apply(running: &RunningSimulation, input: Input) -> Result<Step, SimulationError> {
    let session = running.session();
    let current = session.read(SessionState::current_index)?;
    match input {
        Input::Show => {}
        Input::Answer(option) => session.select_answer(current, option)?,
        Input::Flag => {
            let flagged = session.toggle_flag(current)?;
            println!("{}", if flagged { "flagged" } else { "unflagged" });
            return Ok(Step::Continue);
        }
        Input::Next => session.next()?,
        Input::Previous => session.previous()?,
        Input::Goto(index) => session.navigate_to(index)?,
        Input::Reveal => {
            let feedback = session.reveal(current)?;
            let verdict = match feedback.outcome {
                AnswerOutcome::Correct => "correct",
                AnswerOutcome::Incorrect => "incorrect",
                AnswerOutcome::Unanswered => "not answered",
            };
            println!("{verdict}; the answer is {}", feedback.correct_option + 1);
            if let Some(explanation) = feedback.explanation {
                println!("  {explanation}");
            }
            return Ok(Step::Continue);
        }
        Input::Submit => return Ok(Step::Submit),
        Input::Quit => return Ok(Step::Leave),
        Input::Help => {
            println!("{HELP}");
            return Ok(Step::Continue);
        }
    }
    println!("{}", session.read(render)?);
    Ok(Step::Continue)
}

fn clock_face(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn render(state: &SessionState) -> String {
    let index = state.current_index();
    let question = state.current_question();
    let progress = state.progress();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "\n[{}/{}] {} left  answered {}  flagged {}{}",
        index + 1,
        progress.total,
        clock_face(progress.remaining_seconds),
        progress.answered,
        progress.flagged,
        if state.is_flagged(index) { "  (flagged)" } else { "" },
    );
    if let Some(passage) = question.passage() {
        let _ = writeln!(out, "{passage}\n");
    }
    let _ = writeln!(out, "{}", question.prompt());
    for (i, option) in question.options().iter().enumerate() {
        let mark = if state.answer(index) == Some(i) { '*' } else { ' ' };
        let _ = writeln!(out, " {mark}{}) {option}", i + 1);
    }
    out
}

fn render_result(finished: &FinishedSimulation) -> String {
    let r = &finished.result;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\nscore {}%  ({} correct, {} incorrect, {} unanswered of {})  {} used, {}",
        r.score_percent(),
        r.correct_count(),
        r.incorrect_count(),
        r.unanswered_count(),
        r.total_questions(),
        clock_face(r.elapsed_seconds()),
        r.reason(),
    );
    for (kind, tally) in r.breakdown_by_kind() {
        let _ = writeln!(out, "  {:<22} {}/{}", kind.as_str(), tally.correct, tally.total);
    }
    for (difficulty, tally) in r.breakdown_by_difficulty() {
        let _ = writeln!(
            out,
            "  {:<22} {}/{}",
            difficulty.as_str(),
            tally.correct,
            tally.total
        );
    }
    for (i, review) in r.review().iter().enumerate() {
        if review.outcome == AnswerOutcome::Correct {
            continue;
        }
        let chosen = review
            .chosen
            .map_or_else(|| "-".to_string(), |c| (c + 1).to_string());
        let _ = writeln!(
            out,
            "  #{:<3} chose {chosen}, answer {}{}",
            i + 1,
            review.question.correct_option() + 1,
            if review.flagged { " (flagged)" } else { "" },
        );
        if let Some(explanation) = review.question.explanation() {
            let _ = writeln!(out, "       {explanation}");
        }
    }
    let _ = writeln!(out, "saved as result #{}", finished.result_id);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_numbers_are_one_based() {
        assert_eq!(Input::parse("2"), Ok(Input::Answer(1)));
        assert_eq!(Input::parse("a 1"), Ok(Input::Answer(0)));
        assert_eq!(Input::parse("g 10"), Ok(Input::Goto(9)));
        assert!(Input::parse("a 0").is_err());
        assert!(Input::parse("g").is_err());
    }

    #[test]
    fn words_map_to_actions() {
        assert_eq!(Input::parse(""), Ok(Input::Show));
        assert_eq!(Input::parse("  next "), Ok(Input::Next));
        assert_eq!(Input::parse("p"), Ok(Input::Previous));
        assert_eq!(Input::parse("submit"), Ok(Input::Submit));
        assert!(Input::parse("dance").is_err());
    }

    #[test]
    fn clock_face_pads_minutes_and_seconds() {
        assert_eq!(clock_face(0), "00:00");
        assert_eq!(clock_face(1_199), "19:59");
    }
}
