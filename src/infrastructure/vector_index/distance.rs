use crate::domain::Metric;

pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Higher is closer for every metric. Norms are passed in so callers can
/// cache them per stored vector.
pub fn similarity(metric: Metric, a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    match metric {
        Metric::Cosine => {
            if norm_a == 0.0 || norm_b == 0.0 {
                return 0.0;
            }
            (dot(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0)
        }
        Metric::Euclidean => -euclidean_distance(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_matches_domain_cosine() {
        let a = [0.2, 0.7, -0.1];
        let b = [0.9, -0.3, 0.4];
        let ours = similarity(Metric::Cosine, &a, magnitude(&a), &b, magnitude(&b));
        let domain = crate::domain::cosine_similarity(&a, &b);
        assert!((ours - domain).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_is_negated_distance() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        let sim = similarity(Metric::Euclidean, &a, magnitude(&a), &b, magnitude(&b));
        assert!((sim + 5.0).abs() < 1e-6);
    }
}
