//! Terminal output for line results and constants

use colored::*;
use notecalc_engine::{EquationParts, GlobalConstant, LineResult};

fn print_equation(parts: &EquationParts) {
    println!("    {}", parts.symbolic);
    println!("    {}", parts.result.green());
}

pub fn print_line(result: &LineResult) {
    if let Some(parts) = result.equation() {
        print_equation(parts);
        return;
    }
    match result {
        LineResult::Comment { text } => println!("  {}", text.dimmed()),
        LineResult::Assignment {
            name,
            expr,
            display,
            ..
        } => println!("  {} = {}  {} {}", name.bright_cyan(), expr, "=>".dimmed(), display.green()),
        LineResult::Conversion {
            expr,
            target,
            display,
            ..
        } => println!("  {} -> {}  {} {}", expr, target, "=>".dimmed(), display.green()),
        LineResult::Expression { expr, display, .. } => {
            println!("  {}  {} {}", expr, "=>".dimmed(), display.green())
        }
        LineResult::Error { message } => println!("  {} {}", "ERROR".red(), message),
    }
}

pub fn print_block_header(line: u64) {
    println!("{}", format!("calc block at line {}", line + 1).bright_cyan());
}

pub fn print_constants(constants: &[GlobalConstant]) {
    if constants.is_empty() {
        println!("{}", "No global constants defined".dimmed());
        return;
    }
    let width = constants.iter().map(|c| c.name.len()).max().unwrap_or(0);
    for constant in constants {
        let source = constant.source_expression.as_deref().unwrap_or("-");
        let name = format!("{:<width$}", constant.name, width = width);
        println!(
            "  {}  {}  {}",
            name.bright_cyan(),
            constant.display.green(),
            format!("({})", source).dimmed()
        );
    }
}
