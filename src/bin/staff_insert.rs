use anyhow::{Context, bail};
use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher};

const USAGE: &str = "Usage: staff_insert <email> <display name> <password> [admin|front_desk]";

fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let email = args.next().context(USAGE)?.trim().to_ascii_lowercase();
    let display_name = args.next().context(USAGE)?;
    let password = args.next().context(USAGE)?;
    let role = args.next().unwrap_or_else(|| "front_desk".to_string());

    if !email.contains('@') {
        bail!("{email:?} is not an email address");
    }
    if role != "admin" && role != "front_desk" {
        bail!("role must be admin or front_desk (got {role:?})");
    }

    let salt = SaltString::generate(&mut OsRng);
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("hashing failed: {e}"))?
        .to_string();

    println!(
        "INSERT INTO staff_user (email, display_name, password_hash, role) VALUES ({}, {}, {}, {});",
        sql_literal(&email),
        sql_literal(&display_name),
        sql_literal(&phc),
        sql_literal(&role),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(sql_literal("O'Brien"), "'O''Brien'");
        assert_eq!(sql_literal("desk@clinic.test"), "'desk@clinic.test'");
    }
}
