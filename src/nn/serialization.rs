/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : Model 参数序列化（save_params/load_params）
 *
 * 文件格式（小端）：
 * 魔数 b"GSPR" | 版本 u32 | 参数数量 u32 |
 * 每个参数：名称长度 u32 | 名称(UTF-8) | 维数 u32 | 各维 u32 | 数据 f32...
 *
 * 名称即 `"{层名}.{参数名}"`；加载时文件中模型没有的参数会被忽略，形状不符则报错。
 */

use super::layer::TraitLayer;
use super::{Model, ModelError, param_key};
use crate::tensor::Tensor;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const PARAMS_MAGIC: &[u8; 4] = b"GSPR";
const PARAMS_VERSION: u32 = 1;

fn write_u32<W: Write>(writer: &mut W, value: u32, what: &str) -> Result<(), ModelError> {
    writer
        .write_all(&value.to_le_bytes())
        .map_err(|e| ModelError::Params(format!("写入{what}失败: {e}")))
}

/// 计数、长度、维度都以u32写入，超出范围时报错而不是截断
pub(super) fn to_u32(value: usize, what: &str) -> Result<u32, ModelError> {
    u32::try_from(value).map_err(|_| ModelError::Params(format!("{what}{value}超出了u32的范围")))
}

/// 读取恰好`len`个字节；缓冲区随读取增长，文件被截断时报错
fn read_bytes<R: Read>(reader: &mut R, len: usize, what: &str) -> Result<Vec<u8>, ModelError> {
    let mut bytes = Vec::new();
    reader
        .by_ref()
        .take(len as u64)
        .read_to_end(&mut bytes)
        .map_err(|e| ModelError::Params(format!("读取{what}失败: {e}")))?;
    if bytes.len() != len {
        return Err(ModelError::Params(format!(
            "读取{what}失败：需要{len}字节，文件中只剩{}字节",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn read_u32<R: Read>(reader: &mut R, what: &str) -> Result<u32, ModelError> {
    let mut bytes = [0u8; 4];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| ModelError::Params(format!("读取{what}失败: {e}")))?;
    Ok(u32::from_le_bytes(bytes))
}

impl Model {
    /// 保存所有参数到二进制文件
    pub fn save_params<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        let file = File::create(path.as_ref())
            .map_err(|e| ModelError::Params(format!("无法创建参数文件: {e}")))?;
        let mut writer = BufWriter::new(file);
        let params = self.parameters();

        writer
            .write_all(PARAMS_MAGIC)
            .map_err(|e| ModelError::Params(format!("写入魔数失败: {e}")))?;
        write_u32(&mut writer, PARAMS_VERSION, "版本")?;
        write_u32(&mut writer, to_u32(params.len(), "参数数量")?, "参数数量")?;

        for (name, value) in &params {
            let name_bytes = name.as_bytes();
            write_u32(&mut writer, to_u32(name_bytes.len(), "名称长度")?, "名称长度")?;
            writer
                .write_all(name_bytes)
                .map_err(|e| ModelError::Params(format!("写入名称失败: {e}")))?;

            write_u32(&mut writer, to_u32(value.dimension(), "形状维度")?, "形状维度")?;
            for &dim in value.shape() {
                write_u32(&mut writer, to_u32(dim, "形状")?, "形状")?;
            }
            for val in value.view().iter() {
                writer
                    .write_all(&val.to_le_bytes())
                    .map_err(|e| ModelError::Params(format!("写入数据失败: {e}")))?;
            }
        }

        writer
            .flush()
            .map_err(|e| ModelError::Params(format!("刷新缓冲区失败: {e}")))
    }

    /// 从二进制文件加载参数，返回实际载入的参数个数
    pub fn load_params<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, ModelError> {
        let file = File::open(path.as_ref())
            .map_err(|e| ModelError::Params(format!("无法打开参数文件: {e}")))?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|e| ModelError::Params(format!("读取魔数失败: {e}")))?;
        if &magic != PARAMS_MAGIC {
            return Err(ModelError::Params(
                "无效的参数文件：请确保使用 save_params() 保存的文件".to_string(),
            ));
        }
        let version = read_u32(&mut reader, "版本")?;
        if version != PARAMS_VERSION {
            return Err(ModelError::Params(format!("不支持的参数文件版本: {version}")));
        }
        let count = read_u32(&mut reader, "参数数量")?;

        let mut loaded: HashMap<String, Tensor> = HashMap::new();
        for _ in 0..count {
            let name_len = read_u32(&mut reader, "名称长度")? as usize;
            let name_bytes = read_bytes(&mut reader, name_len, "名称")?;
            let name = String::from_utf8(name_bytes)
                .map_err(|e| ModelError::Params(format!("名称编码无效: {e}")))?;

            let dims = read_u32(&mut reader, "形状维度")? as usize;
            let shape = (0..dims)
                .map(|_| read_u32(&mut reader, "形状").map(|d| d as usize))
                .collect::<Result<Vec<_>, _>>()?;

            let byte_len = shape
                .iter()
                .try_fold(std::mem::size_of::<f32>(), |acc, &d| acc.checked_mul(d))
                .ok_or_else(|| ModelError::Params(format!("参数{name}的形状{shape:?}过大")))?;
            let data: Vec<f32> = read_bytes(&mut reader, byte_len, "数据")?
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            loaded.insert(name, Tensor::new(&data, &shape));
        }

        // 先整体校验形状，全部通过后才写入
        let mut assignments = 0;
        for (key, current) in self.parameters() {
            if let Some(tensor) = loaded.get(&key) {
                if !tensor.is_same_shape(current) {
                    return Err(ModelError::Params(format!(
                        "参数{key}形状不匹配：模型中为{:?}，文件中为{:?}",
                        current.shape(),
                        tensor.shape()
                    )));
                }
                assignments += 1;
            }
        }

        for node in self.nodes_mut() {
            let layer_name = node.name().to_string();
            let Some(layer) = Model::layer_mut(node) else {
                continue;
            };
            for (param, slot) in layer.parameters_mut() {
                if let Some(tensor) = loaded.remove(&param_key(&layer_name, param)) {
                    *slot = tensor;
                }
            }
        }
        Ok(assignments)
    }
}
