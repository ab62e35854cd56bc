use proptest::prelude::*;

use common::symbols::normalize_coin;
use selector::delisting::parse_delisting_title;

proptest! {
    #[test]
    fn normalize_coin_is_idempotent(symbol in "[A-Z]{2,8}(USDT)?") {
        let once = normalize_coin(&symbol);
        prop_assert_eq!(normalize_coin(&once), once.clone());
    }

    #[test]
    fn scaled_variants_normalize_to_the_same_coin(
        coin in "[A-Z]{2,6}",
        prefix in prop::sample::select(vec!["1000", "10000", "1000000"]),
    ) {
        let plain = normalize_coin(&format!("{coin}USDT"));
        let scaled = normalize_coin(&format!("{prefix}{coin}USDT"));
        prop_assert_eq!(plain, scaled);
    }

    #[test]
    fn single_coin_titles_parse_to_one_symbol(coin in "[A-Z]{2,8}") {
        let title = format!("Delisting of {coin}USDT Perpetual Contract");
        prop_assert_eq!(parse_delisting_title(&title), vec![format!("{coin}USDT")]);
    }

    #[test]
    fn parsed_symbols_always_carry_the_quote_suffix(title in ".{0,80}") {
        for symbol in parse_delisting_title(&title) {
            prop_assert!(symbol.ends_with("USDT"), "symbol {} from {:?}", symbol, title);
        }
    }
}
