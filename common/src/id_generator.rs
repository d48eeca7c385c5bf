use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "Swift", "Brave", "Clever", "Mighty", "Silent", "Golden", "Wild", "Noble",
    "Fierce", "Gentle", "Quick", "Wise", "Bold", "Proud", "Cunning", "Sly",
];

const NOUNS: &[&str] = &[
    "Python", "Cobra", "Viper", "Mamba", "Adder", "Boa", "Krait", "Taipan",
    "Asp", "Racer", "Garter", "Copperhead", "Sidewinder", "Anaconda", "Rattler", "Kingsnake",
];

/// Human-readable id for a controlling participant, e.g. `Swift Mamba 4821`.
pub fn generate_client_id() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.random_range(0..NOUNS.len())];
    let suffix: u16 = rng.random_range(1000..10000);
    format!("{} {} {}", adjective, noun, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_has_three_parts() {
        let id = generate_client_id();
        let parts: Vec<&str> = id.split(' ').collect();
        assert_eq!(parts.len(), 3);
        assert!(ADJECTIVES.contains(&parts[0]));
        assert!(NOUNS.contains(&parts[1]));
        assert!(parts[2].parse::<u16>().is_ok());
    }
}
