use tch::{Kind, Tensor};

/// Mean over the batch of `-sum(target * log_softmax(logits))`.
///
/// `logits` are the class scores before the softmax and `target` one-hot rows, both `[batch, classes]`. Working from the scores keeps the gradient `softmax(logits) - target` alive for confidently wrong rows, where the probabilities themselves have underflowed to zero.
pub fn categorical_cross_entropy(logits: &Tensor, target: &Tensor) -> Tensor {
    (target * logits.log_softmax(-1, Kind::Float))
        .sum_dim_intlist(-1, false, Kind::Float)
        .neg()
        .mean(Kind::Float)
}

/// Fraction of rows whose argmax matches the argmax of the one-hot target.
///
/// `prediction` may be probabilities or logits, the argmax is the same.
pub fn categorical_accuracy(prediction: &Tensor, target: &Tensor) -> Tensor {
    prediction
        .argmax(-1, false)
        .eq_tensor(&target.argmax(-1, false))
        .to_kind(Kind::Float)
        .mean(Kind::Float)
}
