//! Manual pairing code.
//!
//! The 11-digit code a user types into a controller app: discriminator high
//! bits and the setup passcode packed into three decimal groups, followed by
//! a Verhoeff check digit.

/// Verhoeff multiplication table (dihedral group D5).
const MULT: [[u8; 10]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
    [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
    [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
    [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
    [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
    [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
    [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
    [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];

/// Verhoeff position permutation.
const PERM: [[u8; 10]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
    [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
    [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
    [9, 4, 5, 3, 1, 2, 6, 8, 7, 0],
    [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
    [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
    [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
];

const INVERSE: [u8; 10] = [0, 4, 3, 2, 1, 5, 6, 7, 8, 9];

/// Setup passcodes a node must never use.
pub const INVALID_PASSCODES: [u32; 12] = [
    0, 11111111, 22222222, 33333333, 44444444, 55555555, 66666666, 77777777, 88888888,
    99999999, 12345678, 87654321,
];

/// Highest valid setup passcode (27 bits, below 99999999).
pub const MAX_PASSCODE: u32 = 99999998;

/// Highest valid discriminator (12 bits).
pub const MAX_DISCRIMINATOR: u16 = 0x0FFF;

pub fn is_valid_discriminator(discriminator: u16) -> bool {
    discriminator <= MAX_DISCRIMINATOR
}

pub fn is_valid_passcode(passcode: u32) -> bool {
    (1..=MAX_PASSCODE).contains(&passcode) && !INVALID_PASSCODES.contains(&passcode)
}

/// Build the 11-digit manual pairing code.
pub fn manual_pairing_code(discriminator: u16, passcode: u32) -> String {
    let short_discriminator = u32::from(discriminator >> 8) & 0x0F;
    let first = short_discriminator >> 2;
    let second = ((short_discriminator & 0x03) << 14) | (passcode & 0x3FFF);
    let third = passcode >> 14;

    let digits = format!("{}{:05}{:04}", first, second, third);
    let check = verhoeff_check_digit(&digits);
    format!("{}{}", digits, check)
}

/// Manual pairing code split as `XXXX-XXX-XXXX` for display.
pub fn formatted_pairing_code(discriminator: u16, passcode: u32) -> String {
    let code = manual_pairing_code(discriminator, passcode);
    format!("{}-{}-{}", &code[..4], &code[4..7], &code[7..])
}

fn verhoeff_check_digit(digits: &str) -> u8 {
    let checksum = digits
        .bytes()
        .rev()
        .enumerate()
        .fold(0u8, |c, (i, b)| {
            let digit = (b - b'0') as usize;
            MULT[c as usize][PERM[(i + 1) % 8][digit] as usize]
        });
    INVERSE[checksum as usize]
}

fn verhoeff_is_valid(code: &str) -> bool {
    code.bytes()
        .rev()
        .enumerate()
        .fold(0u8, |c, (i, b)| {
            let digit = (b - b'0') as usize;
            MULT[c as usize][PERM[i % 8][digit] as usize]
        })
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_code() {
        // Default test credentials used by the Matter SDK
        assert_eq!(manual_pairing_code(3840, 20202021), "34970112332");
        assert_eq!(formatted_pairing_code(3840, 20202021), "3497-011-2332");
    }

    #[test]
    fn test_check_digit_validates() {
        for (d, p) in [(0, 1), (3840, 20202021), (0x0FFF, MAX_PASSCODE), (1234, 5555)] {
            let code = manual_pairing_code(d, p);
            assert_eq!(code.len(), 11);
            assert!(verhoeff_is_valid(&code), "{} failed its own check", code);
        }
    }

    #[test]
    fn test_passcode_validity() {
        assert!(is_valid_passcode(20202021));
        assert!(!is_valid_passcode(0));
        assert!(!is_valid_passcode(12345678));
        assert!(!is_valid_passcode(99999999));
        assert!(!is_valid_passcode(4_000_000_000));
        assert!(is_valid_discriminator(MAX_DISCRIMINATOR));
        assert!(!is_valid_discriminator(0x1000));
    }
}
