//! Summary of population frequencies over all result variants.

use std::collections::HashMap;

use serde::Serialize;

use crate::fetch::freq::FrequencyData;

/// How often a population has the highest or lowest frequency.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PopulationSummary {
    pub pop: String,
    pub max: usize,
    #[serde(rename = "maxPerc")]
    pub max_perc: f64,
    pub min: usize,
    #[serde(rename = "minPerc")]
    pub min_perc: f64,
}

/// First population with the extreme non-null frequency, where
/// `better(candidate, best)` decides replacement.
fn extreme<'a, I, F>(afs: I, better: F) -> Option<&'a str>
where
    I: Iterator<Item = (&'a str, f64)>,
    F: Fn(f64, f64) -> bool,
{
    let mut best: Option<(&str, f64)> = None;
    for (pop, af) in afs {
        match best {
            Some((_, best_af)) if !better(af, best_af) => (),
            _ => best = Some((pop, af)),
        }
    }
    best.map(|(pop, _)| pop)
}

/// Tally, per population, how many variants have their highest and
/// lowest frequency in that population.
///
/// Exomes are used when present, genomes otherwise.
pub fn summarize_frequencies<'a, I>(data: I, populations: &[String]) -> Vec<PopulationSummary>
where
    I: IntoIterator<Item = &'a FrequencyData>,
{
    let mut max_counts: HashMap<&str, usize> = HashMap::new();
    let mut min_counts: HashMap<&str, usize> = HashMap::new();
    let mut total = 0usize;
    for freq in data {
        total += 1;
        let Some(record) = freq.exomes_or_genomes() else {
            continue;
        };
        if let Some(pop) = extreme(record.populations(), |af, best| af > best) {
            *max_counts.entry(pop).or_default() += 1;
        }
        if let Some(pop) = extreme(record.populations(), |af, best| af < best) {
            *min_counts.entry(pop).or_default() += 1;
        }
    }
    if total == 0 {
        return Vec::new();
    }

    populations
        .iter()
        .map(|pop| {
            let max = max_counts.get(pop.as_str()).copied().unwrap_or_default();
            let min = min_counts.get(pop.as_str()).copied().unwrap_or_default();
            PopulationSummary {
                pop: pop.clone(),
                max,
                max_perc: max as f64 / total as f64,
                min,
                min_perc: min as f64 / total as f64,
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use float_cmp::assert_approx_eq;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::summarize_frequencies;
    use crate::{
        fetch::freq::{
            test::{fetcher, ROWS},
            FreqOutcome, FrequencyFetcher,
        },
        variant::Variant,
    };

    fn fetch(fetcher: &FrequencyFetcher, variant: &str) -> super::FrequencyData {
        let variant: Variant = variant.parse().expect("invalid variant");
        match fetcher.fetch(&variant).expect("fetch failed") {
            FreqOutcome::Found(data) => data,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[rstest]
    fn summary_over_variants(fetcher: FrequencyFetcher) {
        assert!(ROWS.len() > 3);
        let data = vec![
            fetch(&fetcher, "1-55039974-G-T"),
            fetch(&fetcher, "1-55039974-G-A"),
            fetch(&fetcher, "1-55040100-A-G"),
        ];
        let summary = summarize_frequencies(&data, &fetcher.populations());
        let pops: Vec<&str> = summary.iter().map(|s| s.pop.as_str()).collect();
        assert_eq!(pops, vec!["afr", "nfe", "fin"]);

        // G-T: max nfe, min afr; G-A: max fin, min afr (first of ties);
        // A-G uses exomes (all zero): first population wins both
        let by_pop = |pop: &str| {
            summary
                .iter()
                .find(|s| s.pop == pop)
                .cloned()
                .expect("missing population")
        };
        assert_eq!((by_pop("nfe").max, by_pop("fin").max, by_pop("afr").max), (1, 1, 1));
        assert_eq!(by_pop("afr").min, 3);
        assert_approx_eq!(f64, by_pop("afr").min_perc, 1.0);
        assert_approx_eq!(f64, by_pop("nfe").max_perc, 1.0 / 3.0);
    }

    #[rstest]
    fn summary_of_nothing(fetcher: FrequencyFetcher) {
        let data: Vec<super::FrequencyData> = Vec::new();
        assert!(summarize_frequencies(&data, &fetcher.populations()).is_empty());
    }
}
