/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 本模块提供分类网络决策的可视化：导向反向传播与显著图后处理
 */

mod export;
pub mod guided_backprop;
pub mod saliency;

pub use export::{
    COLOR_SUFFIX, ExportFormat, GRAY_SUFFIX, NEGATIVE_SUFFIX, POSITIVE_SUFFIX,
    export_saliency_maps, run_guided_backprop,
};
pub use guided_backprop::GuidedBackprop;
pub use saliency::{
    convert_to_grayscale, get_positive_negative_saliency, save_gradient_image, to_gradient_image,
};

#[cfg(test)]
mod tests;
