use mc_core::VertexBasis;
use mc_features::{Observation, F};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{ActionSelector, Device, LinearValueNet, ObservationBatch, QValues};

fn batch_with_states(states: &[Vec<f32>]) -> ObservationBatch {
    let obs: Vec<Observation> = states
        .iter()
        .map(|s| {
            let mut data = vec![0.0f32; s.len() * F];
            for (v, &x) in s.iter().enumerate() {
                data[v * F] = x;
            }
            Observation::from_raw(s.len(), data).unwrap()
        })
        .collect();
    ObservationBatch::from_observations(&obs).unwrap()
}

fn q(b: usize, n: usize, data: Vec<f32>) -> QValues {
    QValues::new(b, n, data, Device::Cpu).unwrap()
}

#[test]
fn reversible_selection_is_plain_argmax_with_lowest_tie() {
    let sel = ActionSelector::new(true, VertexBasis::Signed);
    let obs = batch_with_states(&[vec![1.0, -1.0, 1.0], vec![-1.0, -1.0, -1.0]]);
    let qv = q(2, 3, vec![0.5, 2.0, 2.0, -3.0, -1.0, -2.0]);
    assert_eq!(sel.select(&obs, &qv).unwrap(), vec![1, 1]);
    assert!(sel.legal_mask(&obs).iter().all(|&x| x));
}

#[test]
fn irreversible_masks_flipped_vertices_in_both_bases() {
    let signed = ActionSelector::new(false, VertexBasis::Signed);
    let obs = batch_with_states(&[vec![-1.0, 1.0, -1.0]]);
    assert_eq!(signed.legal_mask(&obs), vec![false, true, false]);
    let qv = q(1, 3, vec![9.0, 0.0, 8.0]);
    assert_eq!(signed.select(&obs, &qv).unwrap(), vec![1]);

    let binary = ActionSelector::new(false, VertexBasis::Binary);
    let obs = batch_with_states(&[vec![1.0, 1.0, 0.0]]);
    assert_eq!(binary.legal_mask(&obs), vec![false, false, true]);
    assert_eq!(binary.select(&obs, &qv).unwrap(), vec![2]);
}

#[test]
fn fully_masked_row_falls_back_to_unmasked_argmax() {
    let sel = ActionSelector::new(false, VertexBasis::Signed);
    let obs = batch_with_states(&[vec![-1.0, -1.0, -1.0], vec![1.0, -1.0, -1.0]]);
    let qv = q(2, 3, vec![0.0, 5.0, 1.0, -9.0, 5.0, 1.0]);
    assert_eq!(sel.select(&obs, &qv).unwrap(), vec![1, 0]);
}

#[test]
fn never_selects_illegal_when_a_legal_action_exists() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for basis in [VertexBasis::Signed, VertexBasis::Binary] {
        let sel = ActionSelector::new(false, basis);
        let flipped = if basis == VertexBasis::Binary { 1.0 } else { -1.0 };
        let unflipped = basis.unflipped() as f32;
        for _ in 0..200 {
            let b = rng.gen_range(1..6);
            let n = rng.gen_range(1..9);
            let states: Vec<Vec<f32>> = (0..b)
                .map(|_| {
                    (0..n)
                        .map(|_| if rng.gen_bool(0.6) { flipped } else { unflipped })
                        .collect()
                })
                .collect();
            let obs = batch_with_states(&states);
            let qv = q(b, n, (0..b * n).map(|_| rng.gen_range(-5.0..5.0)).collect());
            let actions = sel.select(&obs, &qv).unwrap();
            assert_eq!(actions.len(), b);
            for (row, &a) in actions.iter().enumerate() {
                assert!(a < n);
                if states[row].iter().any(|&s| s == unflipped) {
                    assert_eq!(states[row][a], unflipped);
                }
            }
        }
    }
}

#[test]
fn mismatched_q_shape_is_an_error() {
    let sel = ActionSelector::new(true, VertexBasis::Signed);
    let obs = batch_with_states(&[vec![1.0, 1.0]]);
    assert!(sel.select(&obs, &q(1, 3, vec![0.0; 3])).is_err());
}

#[test]
fn predict_places_batch_and_reads_back() {
    let sel = ActionSelector::new(true, VertexBasis::Signed);
    let mut data = vec![0.0f32; 3 * F];
    data[F + 1] = 0.7;
    let obs = Observation::from_raw(3, data).unwrap();
    let net = LinearValueNet::immediate_reward();
    let actions = sel
        .predict(&net, ObservationBatch::single(&obs), Device::Cpu)
        .unwrap();
    assert_eq!(actions, vec![1]);

    // The local backend refuses accelerator placement.
    assert!(sel
        .predict(&net, ObservationBatch::single(&obs), Device::Mps)
        .is_err());
}
