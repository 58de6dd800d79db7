/// Number of diagnoses reported per request.
pub const TOP_K: usize = 3;
/// Top-1 probabilities strictly below this are flagged as low confidence.
pub const CONFIDENCE_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedLabel {
    pub index: usize,
    pub probability: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub top: Vec<RankedLabel>,
    pub low_confidence: bool,
}

impl Ranking {
    pub fn best(&self) -> Option<&RankedLabel> {
        self.top.first()
    }
}

/// Orders a probability vector into the top-k diagnoses.
///
/// Sorting is by probability descending with ties going to the lower label
/// index. The input is not renormalised or validated; NaN entries rank last.
pub fn rank(probabilities: &[f32]) -> Ranking {
    rank_top(probabilities, TOP_K)
}

pub fn rank_top(probabilities: &[f32], k: usize) -> Ranking {
    let mut indexed: Vec<RankedLabel> = probabilities
        .iter()
        .enumerate()
        .map(|(index, &probability)| RankedLabel { index, probability })
        .collect();
    indexed.sort_by(|a, b| {
        sort_key(b.probability)
            .total_cmp(&sort_key(a.probability))
            .then_with(|| a.index.cmp(&b.index))
    });
    indexed.truncate(k);

    let low_confidence = indexed
        .first()
        .map_or(true, |best| best.probability.is_nan() || best.probability < CONFIDENCE_THRESHOLD);
    Ranking {
        top: indexed,
        low_confidence,
    }
}

fn sort_key(probability: f32) -> f32 {
    if probability.is_nan() {
        f32::NEG_INFINITY
    } else {
        probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(ranking: &Ranking) -> Vec<usize> {
        ranking.top.iter().map(|r| r.index).collect()
    }

    #[test]
    fn five_label_scenario() {
        let ranking = rank(&[0.05, 0.75, 0.05, 0.05, 0.10]);
        assert_eq!(indices(&ranking), vec![1, 4, 0]);
        assert_eq!(ranking.top[0].probability, 0.75);
        assert!(!ranking.low_confidence);
    }

    #[test]
    fn ties_resolve_to_lower_index() {
        let ranking = rank(&[0.2, 0.3, 0.3, 0.2]);
        assert_eq!(indices(&ranking), vec![1, 2, 0]);
    }

    #[test]
    fn output_is_sorted_and_bounded() {
        let vectors: [&[f32]; 4] = [
            &[],
            &[1.0],
            &[0.4, 0.6],
            &[0.01, 0.09, 0.3, 0.2, 0.15, 0.25],
        ];
        for probabilities in vectors {
            let ranking = rank(probabilities);
            assert!(ranking.top.len() <= TOP_K);
            assert_eq!(ranking.top.len(), probabilities.len().min(TOP_K));
            assert!(ranking.top.windows(2).all(|w| w[0].probability >= w[1].probability));
        }
    }

    #[test]
    fn threshold_is_strict() {
        assert!(rank(&[0.6999, 0.3001]).low_confidence);
        assert!(!rank(&[0.70, 0.30]).low_confidence);
    }

    #[test]
    fn empty_vector_is_low_confidence() {
        let ranking = rank(&[]);
        assert!(ranking.top.is_empty());
        assert!(ranking.low_confidence);
        assert!(ranking.best().is_none());
    }

    #[test]
    fn nan_never_outranks_real_probabilities() {
        let ranking = rank(&[f32::NAN, 0.1, 0.9]);
        assert_eq!(indices(&ranking), vec![2, 1, 0]);
        assert!(!ranking.low_confidence);
    }
}
