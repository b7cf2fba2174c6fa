//! One-shot subcommands. Output is for people, not scripts.

use anyhow::{bail, Result};
use chrono::Utc;
use colored::*;
use dialoguer::{theme::ColorfulTheme, Input, Password, Select};
use std::io::Write;
use truthlens_core::{
    AnalysisKind, AnalysisRequest, AnalysisResult, EvidenceKind, HistoryFilter, Remaining,
    TruthLens, VerificationResult, VerificationStatus, Verdict,
};

pub fn parse_kind(s: &str) -> std::result::Result<AnalysisKind, String> {
    AnalysisKind::from_str(s).ok_or_else(|| format!("unknown kind '{}', use text, link or image", s))
}

fn verdict_badge(verdict: Verdict) -> ColoredString {
    let label = format!(" {} ", verdict.label().to_uppercase());
    match verdict {
        Verdict::Verified => label.black().on_green(),
        Verdict::Suspicious => label.black().on_yellow(),
        Verdict::Fake => label.white().on_red(),
        Verdict::Unknown => label.black().on_white(),
    }
}

fn print_result(result: &AnalysisResult) {
    println!(
        "\n{}  {}% confidence\n",
        verdict_badge(result.verdict).bold(),
        result.confidence
    );
    println!("{}", result.explanation);

    if !result.indicators.is_empty() {
        println!("\n{}", "Indicators".bold());
        for indicator in &result.indicators {
            println!("  {:<28} {:>3}%", indicator.label, indicator.value);
        }
    }
    if !result.evidence.is_empty() {
        println!("\n{}", "Evidence".bold());
        for evidence in &result.evidence {
            let mark = match evidence.kind {
                EvidenceKind::Info => "i".blue(),
                EvidenceKind::Warning => "!".yellow(),
                EvidenceKind::Danger => "x".red(),
                EvidenceKind::Success => "+".green(),
            };
            println!("  [{}] {}", mark.bold(), evidence.text);
        }
    }
    if !result.suggested_action.is_empty() {
        println!("\n{} {}", "What to do:".bold().cyan(), result.suggested_action);
    }
}

fn print_verification(verification: &VerificationResult) {
    let label = format!(" {} ", verification.status.label().to_uppercase());
    let badge = match verification.status {
        VerificationStatus::Verified => label.black().on_green(),
        VerificationStatus::Unverified => label.black().on_white(),
        VerificationStatus::Misleading => label.black().on_yellow(),
        VerificationStatus::LikelyFake => label.white().on_red(),
    };
    println!("\n{}  {}% confidence", badge.bold(), verification.confidence);
    match &verification.entity.official_domain {
        Some(domain) => println!("Entity: {} ({})", verification.entity.name.bold(), domain),
        None => println!("Entity: {}", verification.entity.name.bold()),
    }
    println!("\n{}", verification.explanation);
    for discrepancy in &verification.verification.discrepancies {
        println!("  {} {}", "-".yellow(), discrepancy);
    }
    if !verification.suggested_action.is_empty() {
        println!("\n{} {}", "What to do:".bold().cyan(), verification.suggested_action);
    }
    for source in &verification.sources {
        println!("  {}", source.blue().underline());
    }
}

pub async fn analyze(lens: &TruthLens, kind: AnalysisKind, input: &str) -> Result<()> {
    let request = AnalysisRequest::from_input(kind, input).await?;
    println!("🔍 Analyzing {}...", kind.display_name().to_lowercase().cyan());
    let result = lens.analyze(request).await?;
    print_result(&result);
    if let Remaining::Limited(n) = lens.remaining()? {
        println!("\n{}", format!("{} free analyses left", n).dimmed());
    }
    Ok(())
}

pub async fn verify(lens: &TruthLens, kind: AnalysisKind, content: &str) -> Result<()> {
    if kind == AnalysisKind::Image {
        bail!("Source verification works on text and links");
    }
    println!("🏛  Checking official sources...");
    let verification = lens.verify(content, kind).await?;
    print_verification(&verification);
    Ok(())
}

/// Single-turn chat; the reply is streamed to stdout as it arrives.
/// Writes the unseen tail of a growing reply. Stops at the first write error.
struct StreamPrinter<W: Write> {
    out: W,
    printed: usize,
    error: Option<std::io::Error>,
}

impl<W: Write> StreamPrinter<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            printed: 0,
            error: None,
        }
    }

    fn push(&mut self, running: &str) {
        if self.error.is_some() {
            return;
        }
        if let Some(fresh) = running.get(self.printed..) {
            let written = write!(self.out, "{}", fresh).and_then(|_| self.out.flush());
            if let Err(err) = written {
                self.error = Some(err);
                return;
            }
        }
        self.printed = running.len();
    }

    fn finish(self) -> std::io::Result<()> {
        self.error.map_or(Ok(()), Err)
    }
}

pub async fn chat(lens: &TruthLens, message: &str) -> Result<()> {
    let mut session = lens.chat();
    let mut printer = StreamPrinter::new(std::io::stdout());

    println!("{}", "AI:".bold().yellow());
    session
        .send(message, None, |running| printer.push(running))
        .await?;
    printer.finish()?;
    println!();
    Ok(())
}

pub async fn history(lens: &TruthLens, bookmarked: bool, search: Option<&str>) -> Result<()> {
    if lens.user().is_none() {
        println!("{}", "Sign in to keep a history of your analyses.".yellow());
        return Ok(());
    }
    let filter = if bookmarked {
        HistoryFilter::Bookmarked
    } else {
        HistoryFilter::All
    };
    let mut client = lens.history();
    client.list(filter).await?;
    let items = client.search(search.unwrap_or(""));

    if items.is_empty() {
        println!("{}", "No analyses found".red());
        return Ok(());
    }
    println!("\n{} analyses:\n", items.len().to_string().bold().green());
    for item in items {
        let star = if item.is_bookmarked { "★".yellow() } else { " ".normal() };
        println!(
            "{} {} {} {}  {}",
            star,
            item.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            verdict_badge(item.verdict()),
            item.analysis_type.display_name().dimmed(),
            item.content.as_deref().unwrap_or("(image)").replace('\n', " ")
        );
    }
    Ok(())
}

pub async fn stats(lens: &TruthLens) -> Result<()> {
    if lens.user().is_none() {
        println!("{}", "Sign in to see your statistics.".yellow());
        return Ok(());
    }
    let stats = lens.dashboard(Utc::now().date_naive()).await?;

    println!("\n{}", "📊 Dashboard".bold().blue());
    println!("{}", "=".repeat(40).dimmed());
    println!("Total checks  {}", stats.total.to_string().bold());
    println!("Verified      {}", stats.verified.to_string().green());
    println!("Suspicious    {}", stats.suspicious.to_string().yellow());
    println!("Fake / Scam   {}", stats.fake.to_string().red());
    println!("Bookmarked    {}", stats.bookmarked);
    for (kind, n) in stats.kind_breakdown() {
        println!("  {:<10} {}", kind.display_name(), n);
    }

    println!("\n{}", "Last 7 days".bold());
    for day in &stats.activity {
        println!(
            "  {} {} {}",
            day.date.format("%a %d").to_string().dimmed(),
            "█".repeat(day.count).cyan(),
            day.count
        );
    }
    Ok(())
}

pub async fn login(lens: &TruthLens, sign_up: bool) -> Result<()> {
    if let Some(user) = lens.user() {
        println!("Already signed in as {}", user.display_name().bold());
        return Ok(());
    }
    let theme = ColorfulTheme::default();
    let methods = ["Email and password", "Phone (one-time code)"];
    let method = if sign_up {
        0
    } else {
        Select::with_theme(&theme)
            .with_prompt("Sign in with")
            .items(&methods)
            .default(0)
            .interact()?
    };

    let user = if method == 0 {
        let email: String = Input::with_theme(&theme).with_prompt("Email").interact_text()?;
        let password = Password::with_theme(&theme).with_prompt("Password").interact()?;
        if sign_up {
            lens.sign_up(email.trim(), &password).await?;
            println!("{}", "Account created. Check your email to confirm it.".green());
        }
        lens.sign_in(email.trim(), &password).await?
    } else {
        let phone: String = Input::with_theme(&theme)
            .with_prompt("Phone (with country code)")
            .interact_text()?;
        lens.send_phone_otp(phone.trim()).await?;
        let code: String = Input::with_theme(&theme).with_prompt("Code").interact_text()?;
        lens.verify_phone_otp(phone.trim(), code.trim()).await?
    };

    println!("✅ Signed in as {}", user.display_name().bold().green());
    Ok(())
}

pub async fn logout(lens: &TruthLens) -> Result<()> {
    lens.sign_out().await?;
    println!("Signed out");
    Ok(())
}

pub fn usage(lens: &TruthLens) -> Result<()> {
    match (lens.user(), lens.remaining()?) {
        (Some(user), _) => println!("Signed in as {}: unlimited analyses", user.display_name().bold()),
        (None, Remaining::Limited(0)) => {
            println!("{}", "Free trial exhausted. Run `truthlens login` to continue.".red())
        }
        (None, remaining) => println!("{} free analyses left", remaining.to_string().bold()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPipe {
        attempts: usize,
    }

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            self.attempts += 1;
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn stream_printer_writes_only_the_new_tail() {
        let mut printer = StreamPrinter::new(Vec::new());
        for running in ["Hel", "Hello", "Hello, world"] {
            printer.push(running);
        }
        assert_eq!(printer.out, b"Hello, world");
        assert!(printer.finish().is_ok());
    }

    #[test]
    fn stream_printer_stops_after_a_write_error() {
        let mut printer = StreamPrinter::new(BrokenPipe { attempts: 0 });
        printer.push("a");
        printer.push("ab");
        printer.push("abc");
        assert_eq!(printer.out.attempts, 1);
        let err = printer.finish().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn kind_argument_accepts_url_alias() {
        assert_eq!(parse_kind("URL"), Ok(AnalysisKind::Link));
        assert!(parse_kind("video").is_err());
    }
}
