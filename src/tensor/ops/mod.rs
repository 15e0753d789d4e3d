/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 张量的逐元素四则运算。
 *                 张量与张量之间要求形状严格一致（本crate的前向/反向计算中不需要广播），
 *                 张量与纯数之间则把纯数作用到每个元素上。
 */

use crate::errors::{Operator, TensorError};
use crate::tensor::Tensor;
use ndarray::Zip;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

fn assert_same_shape(operator: Operator, tensor_1: &Tensor, tensor_2: &Tensor) {
    assert!(
        tensor_1.is_same_shape(tensor_2),
        "{}",
        TensorError::OperatorError {
            operator,
            tensor1_shape: tensor_1.shape().to_vec(),
            tensor2_shape: tensor_2.shape().to_vec(),
        }
    );
}

/// 为（不）带引用的张量 ⊕（不）带引用的张量 生成运算符实现
macro_rules! impl_elementwise_op {
    ($trait:ident, $method:ident, $operator:expr, $op:tt) => {
        impl<'a, 'b> $trait<&'b Tensor> for &'a Tensor {
            type Output = Tensor;

            fn $method(self, other: &'b Tensor) -> Tensor {
                assert_same_shape($operator, self, other);
                Tensor::from_array(&self.data $op &other.data)
            }
        }

        impl<'b> $trait<&'b Tensor> for Tensor {
            type Output = Tensor;

            fn $method(self, other: &'b Tensor) -> Tensor {
                (&self).$method(other)
            }
        }

        impl $trait<Tensor> for &Tensor {
            type Output = Tensor;

            fn $method(self, other: Tensor) -> Tensor {
                self.$method(&other)
            }
        }

        impl $trait for Tensor {
            type Output = Tensor;

            fn $method(self, other: Tensor) -> Tensor {
                (&self).$method(&other)
            }
        }
    };
}

impl_elementwise_op!(Add, add, Operator::Add, +);
impl_elementwise_op!(Sub, sub, Operator::Sub, -);
impl_elementwise_op!(Mul, mul, Operator::Mul, *);

/*↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓张量与纯数↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓*/
impl Mul<f32> for &Tensor {
    type Output = Tensor;

    fn mul(self, scalar: f32) -> Tensor {
        Tensor::from_array(&self.data * scalar)
    }
}

impl Mul<f32> for Tensor {
    type Output = Tensor;

    fn mul(self, scalar: f32) -> Tensor {
        Tensor::from_array(self.data * scalar)
    }
}

impl Div<f32> for &Tensor {
    type Output = Tensor;

    /// 除数为零时panic
    fn div(self, scalar: f32) -> Tensor {
        assert!(scalar != 0.0, "{}", TensorError::DivByZero);
        Tensor::from_array(&self.data / scalar)
    }
}

impl Neg for &Tensor {
    type Output = Tensor;

    fn neg(self) -> Tensor {
        Tensor::from_array(-&self.data)
    }
}
/*↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑张量与纯数↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑*/

impl AddAssign<&Tensor> for Tensor {
    fn add_assign(&mut self, other: &Tensor) {
        assert_same_shape(Operator::AddAssign, self, other);
        Zip::from(&mut self.data)
            .and(&other.data)
            .for_each(|a, &b| *a += b);
    }
}

impl Tensor {
    /// 逐元素映射，返回新张量
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f32) -> f32,
    {
        Self::from_array(self.data.mapv(f))
    }
}
