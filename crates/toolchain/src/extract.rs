//! Outcome extraction from tool output.
//!
//! Each deployment tool reports its result as free-form text. These
//! scanners pull the one value we care about out of that text. Marker
//! lines emitted by our own scripts are checked first; the tool's
//! native phrasing is the fallback.

/// Marker our scripted container runs print in front of the final address.
pub const DEPLOY_RESULT_MARKER: &str = "DEPLOY_RESULT:";

fn is_base58_char(c: char) -> bool {
    c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l')
}

fn is_bech32_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

/// Parse a SOL amount from CLI output such as `"1.99 SOL"` or
/// `"Balance: 2 SOL"`. Returns the first number directly followed by
/// the `SOL` unit.
pub fn sol_balance(output: &str) -> Option<f64> {
    for line in output.lines() {
        let Some(idx) = line.find(" SOL") else {
            continue;
        };
        let head = &line[..idx];
        let number: String = head
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if let Ok(value) = number.parse::<f64>() {
            return Some(value);
        }
    }
    None
}

/// Transaction signature from `solana` CLI output (`Signature: <base58>`).
pub fn deploy_signature(output: &str) -> Option<String> {
    for line in output.lines() {
        let Some(rest) = line.trim().strip_prefix("Signature:") else {
            continue;
        };
        let sig: String = rest.trim().chars().take_while(|c| is_base58_char(*c)).collect();
        if !sig.is_empty() {
            return Some(sig);
        }
    }
    None
}

/// Program id reported by `solana program deploy` (`Program Id: <base58>`).
pub fn program_id(output: &str) -> Option<String> {
    for line in output.lines() {
        let Some(rest) = line.trim().strip_prefix("Program Id:") else {
            continue;
        };
        let id: String = rest.trim().chars().take_while(|c| is_base58_char(*c)).collect();
        if !id.is_empty() {
            return Some(id);
        }
    }
    None
}

/// Package address from resim output.
///
/// The scripted run prints `DEPLOY_RESULT:<address>` as its last step;
/// older script revisions only had resim's own `Success! New Package:
/// package_sim1...` line, so scan for a bare `package_sim1` token when
/// the marker is absent.
pub fn package_address(output: &str) -> Option<String> {
    for line in output.lines() {
        if let Some(rest) = line.trim().strip_prefix(DEPLOY_RESULT_MARKER) {
            let addr = rest.trim();
            if !addr.is_empty() {
                return Some(addr.to_string());
            }
        }
    }
    bech32_token(output, "package_sim1")
}

/// Account component address from `resim new-account` output.
pub fn simulator_account(output: &str) -> Option<String> {
    bech32_token(output, "account_sim1")
}

fn bech32_token(output: &str, prefix: &str) -> Option<String> {
    let mut search = output;
    while let Some(idx) = search.find(prefix) {
        let candidate: String = search[idx..].chars().take_while(|c| is_bech32_char(*c) || *c == '_').collect();
        // prefix alone is not an address
        if candidate.len() > prefix.len() + 8 {
            return Some(candidate);
        }
        search = &search[idx + prefix.len()..];
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sol_balance_plain() {
        assert_eq!(sol_balance("2 SOL"), Some(2.0));
        assert_eq!(sol_balance("1.99 SOL\n"), Some(1.99));
    }

    #[test]
    fn test_sol_balance_with_label() {
        assert_eq!(sol_balance("Balance: 0.5 SOL"), Some(0.5));
    }

    #[test]
    fn test_sol_balance_absent() {
        assert_eq!(sol_balance("Error: airdrop request failed"), None);
        assert_eq!(sol_balance("no SOL here"), None);
    }

    #[test]
    fn test_deploy_signature() {
        let output = "Requesting airdrop of 2 SOL\n\nSignature: 5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYjCJjBRnbJLgp8uirBgmQpjKhoR4tjF3ZpRzrFmBV6UjKdiSZkQUW\n\n2 SOL";
        let sig = deploy_signature(output).unwrap();
        assert!(sig.starts_with("5VERv8"));
        assert!(sig.ends_with("kQUW"));
    }

    #[test]
    fn test_program_id() {
        let output = "Program Id: BPFLoaderUpgradeab1e11111111111111111111111\n";
        assert_eq!(
            program_id(output).unwrap(),
            "BPFLoaderUpgradeab1e11111111111111111111111"
        );
        assert_eq!(program_id("Deploying..."), None);
    }

    #[test]
    fn test_package_address_marker_wins() {
        let output = "Success! New Package: package_sim1qy352fkwcvmn\nDEPLOY_RESULT:package_sim1p4r4955skdjq9swg8s";
        assert_eq!(
            package_address(output).unwrap(),
            "package_sim1p4r4955skdjq9swg8s"
        );
    }

    #[test]
    fn test_package_address_pattern_fallback() {
        let output = "Success! New Package: package_sim1qy352fkwcvmnfk4ef953x0qpq6eqyvvalq";
        assert_eq!(
            package_address(output).unwrap(),
            "package_sim1qy352fkwcvmnfk4ef953x0qpq6eqyvvalq"
        );
    }

    #[test]
    fn test_package_address_ignores_bare_prefix() {
        assert_eq!(package_address("mentions package_sim1 in prose"), None);
    }

    #[test]
    fn test_simulator_account() {
        let output = "Account component address: account_sim1q02r73u7nv47h80e30pc3q6ylsj7xgvqqp5df7ylqzqum";
        let account = simulator_account(output).unwrap();
        assert!(account.starts_with("account_sim1q02r73u"));
    }
}
