//! List commands implementation

use motionflash_core::RecipeBook;

use super::CliError;
use crate::backends;

/// Device path prefixes of USB CDC controllers
const PORT_PREFIXES: &[&str] = &["/dev/ttyACM", "/dev/ttyUSB"];

/// Candidate controller ports, sorted and deduplicated
pub fn candidate_ports<I: IntoIterator<Item = String>>(names: I) -> Vec<String> {
    let mut ports: Vec<String> = names
        .into_iter()
        .filter(|name| PORT_PREFIXES.iter().any(|p| name.starts_with(p)))
        .collect();
    ports.sort();
    ports.dedup();
    ports
}

/// Print candidate controller ports, one per line
pub fn list_ports() -> Result<(), CliError> {
    let available = serialport::available_ports()
        .map_err(|e| CliError::host("cannot enumerate serial ports", e))?;
    let ports = candidate_ports(available.into_iter().map(|p| p.port_name));
    log::debug!("Found {} candidate port(s)", ports.len());
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

/// Print the backends compiled into this binary
pub fn list_backends() {
    println!("Supported backends:");
    println!();
    for backend in backends::available_backends() {
        let aliases = if backend.aliases.is_empty() {
            String::new()
        } else {
            format!(" (aliases: {})", backend.aliases.join(", "))
        };
        println!("  {:<8} - {}{}", backend.name, backend.description, aliases);
    }
}

/// Print the recipes in `book`
pub fn list_recipes(book: &RecipeBook) {
    println!("{:<16} {:>5} {:>10}  Limits", "Recipe", "Steps", "Duration");
    println!("{}", "-".repeat(64));

    for recipe in book.iter() {
        let limits: Vec<String> = recipe.safety_limits().iter().map(ToString::to_string).collect();
        println!(
            "{:<16} {:>5} {:>8}ms  {}",
            recipe.id(),
            recipe.steps().len(),
            recipe.scheduled_duration().as_millis(),
            limits.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_ports() {
        let names = [
            "/dev/ttyUSB1",
            "/dev/ttyS0",
            "/dev/ttyACM0",
            "/dev/ttyUSB0",
            "/dev/ttyACM0",
        ];
        let ports = candidate_ports(names.iter().map(|s| s.to_string()));
        assert_eq!(ports, ["/dev/ttyACM0", "/dev/ttyUSB0", "/dev/ttyUSB1"]);
    }
}
