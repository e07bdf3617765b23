// 本地服务：配置加载与主机密钥

pub mod host_keys;
pub mod storage;
