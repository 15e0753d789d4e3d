use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;

#[test]
fn test_max_min_values() {
    let t = Tensor::new(&[3.0, -1.0, 7.0, 2.0], &[2, 2]);
    assert_eq!(t.max_value(), Some(7.0));
    assert_eq!(t.min_value(), Some(-1.0));
    assert_eq!(Tensor::zeros(&[0]).max_value(), None);
}

#[test]
fn test_argmax_argmin_flat() {
    let t = Tensor::new(&[1.0, 5.0, -3.0, 5.0, -3.0], &[5]);
    // 并列时取第一个
    assert_eq!(t.argmax_flat(), Some(1));
    assert_eq!(t.argmin_flat(), Some(2));
    assert_eq!(Tensor::zeros(&[0]).argmax_flat(), None);
}

#[test]
fn test_sum_axis_keep() {
    // [[[1, 2], [3, 4]], [[5, 6], [7, 8]]]
    let t = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], &[2, 2, 2]);

    let c = t.sum_axis_keep(0);
    assert_eq!(c.shape(), &[1, 2, 2]);
    assert_eq!(c.to_vec(), vec![6.0, 8.0, 10.0, 12.0]);

    let w = t.sum_axis_keep(2);
    assert_eq!(w.shape(), &[2, 2, 1]);
    assert_eq!(w.to_vec(), vec![3.0, 7.0, 11.0, 15.0]);
}

#[test]
#[should_panic(expected = "求和的维度3超出了张量的维数3")]
fn test_sum_axis_keep_out_of_range() {
    Tensor::zeros(&[1, 2, 2]).sum_axis_keep(3);
}

/// 期望值与`numpy.percentile(x, q)`（默认线性插值）一致
#[test]
fn test_percentile_matches_numpy() {
    let t = Tensor::new(&[7.0, 1.0, 3.0, 9.0, 5.0], &[5]);
    assert_eq!(t.percentile(0.0), Some(1.0));
    assert_eq!(t.percentile(50.0), Some(5.0));
    assert_eq!(t.percentile(100.0), Some(9.0));
    // np.percentile([1, 3, 5, 7, 9], 99) == 8.92, np.percentile(..., 1) == 1.08
    assert_abs_diff_eq!(t.percentile(99.0).unwrap(), 8.92, epsilon = 1e-5);
    assert_abs_diff_eq!(t.percentile(1.0).unwrap(), 1.08, epsilon = 1e-5);

    // np.percentile(np.arange(10), 25) == 2.25
    let range = Tensor::new(&(0..10).map(|i| i as f32).collect::<Vec<_>>(), &[2, 5]);
    assert_abs_diff_eq!(range.percentile(25.0).unwrap(), 2.25, epsilon = 1e-6);
}

#[test]
fn test_percentile_edge_cases() {
    assert_eq!(Tensor::zeros(&[0, 3]).percentile(50.0), None);
    assert_eq!(Tensor::new(&[4.0], &[1]).percentile(99.0), Some(4.0));
}

#[test]
#[should_panic(expected = "百分位数须在[0, 100]之间")]
fn test_percentile_out_of_range() {
    Tensor::ones(&[3]).percentile(101.0);
}
