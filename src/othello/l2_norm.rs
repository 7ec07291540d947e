use tch::{
    nn::{Conv, Linear},
    Kind, Tensor,
};

/// Sum of squared weights, used as the weight-decay term of the loss.
pub trait L2Norm {
    fn l2(&self) -> Tensor;
}

impl<T: L2Norm + ?Sized> L2Norm for &T {
    fn l2(&self) -> Tensor {
        (**self).l2()
    }
}

impl L2Norm for Tensor {
    fn l2(&self) -> Tensor {
        (self * self).sum(Kind::Float)
    }
}

impl L2Norm for Linear {
    fn l2(&self) -> Tensor {
        self.ws.l2()
    }
}

impl<ND> L2Norm for Conv<ND> {
    fn l2(&self) -> Tensor {
        self.ws.l2()
    }
}

pub fn total_l2<'a>(layers: impl IntoIterator<Item = &'a dyn L2Norm>) -> Tensor {
    let norms: Vec<Tensor> = layers.into_iter().map(|layer| layer.l2()).collect();
    if norms.is_empty() {
        return Tensor::from(0f32);
    }
    Tensor::stack(&norms, 0).sum(Kind::Float)
}
